//! # Tessera - Embeddable Dataflow Audio Engine
//!
//! Runs a block-based dataflow patch inside a host application and bridges
//! messages, MIDI and audio between the two.
//!
//! ## Architecture
//!
//! Tessera is an umbrella crate over:
//! - **tessera-core** - Instances, receivers, event queues, hooks, block processing
//! - **tessera-midi** - Channel-voice MIDI model with range-checked constructors
//!
//! Messages and MIDI leaving the patch are written into lock-free byte queues while
//! the instance is locked. The host drains them on a thread of its choosing, and the
//! drain invokes the callbacks registered in a [`HookTable`].
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use tessera::prelude::*;
//!
//! let engine = Engine::builder().inputs(0).outputs(2).build().unwrap();
//!
//! let floats = Arc::new(Mutex::new(Vec::new()));
//! let sink = floats.clone();
//! engine
//!     .hooks(|hooks| {
//!         hooks.set_float_hook(move |src, v| sink.lock().unwrap().push((src.to_owned(), v)))
//!     })
//!     .unwrap();
//!
//! engine.bind("gain").unwrap();
//! engine.send_float("gain", 0.25).unwrap();
//!
//! let mut output = vec![0.0f32; 2 * engine.block_size()];
//! engine.process_float(1, &[], &mut output).unwrap();
//! engine.poll().unwrap();
//!
//! assert_eq!(*floats.lock().unwrap(), vec![("gain".to_string(), 0.25)]);
//! ```
//!
//! ## Handle-free use
//!
//! Hosts that prefer a flat boundary can use [`current`], which acts on the calling
//! thread's current instance.

/// Re-export of tessera-core for direct access
pub use tessera_core as core;

/// Re-export of tessera-midi
pub use tessera_midi as midi;

mod builder;
mod engine;
mod error;

pub mod current;

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use error::{Error, Result};

pub use tessera_core::{
    block_size, AtomSlice, Atom, Class, EngineConfig, HookTable, Instance, InstanceGuard, Layout,
    Message, MessageBuilder, MethodContext, Outlet, Patch, PrintConcatenator, ReceiverHandle,
    Sample, Symbol, TickContext, BLOCK_SIZE,
};
pub use tessera_midi::{MidiMessage, PortChannel};

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{Engine, EngineBuilder};

    pub use crate::core::{
        Atom, EngineConfig, HookTable, Layout, Message, MessageBuilder, Outlet, Patch,
        TickContext,
    };

    pub use crate::midi::MidiMessage;
}
