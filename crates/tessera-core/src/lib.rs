//! Real-time bridge between a host and a block-based dataflow audio engine.
//!
//! # Primary API
//!
//! - [`Instance`]: an isolated engine (patch, receivers, clock, event queues)
//! - [`init`], [`new_instance`], [`free_instance`], [`set_current_instance`]: lifecycle
//! - [`HookTable`]: host callbacks run by `drain_control_events` / `drain_midi_events`
//! - [`Patch`] / [`Outlet`] / [`TickContext`]: the seam to the dataflow graph
//! - [`RingBuffer`]: the lock-free byte queue underneath the event bridge
//!
//! # Threads
//!
//! Nothing here spawns threads. Processing and sends run on the caller's thread with
//! the instance locked. Events produced while locked go into two lock-free queues
//! (control and MIDI) which the host drains on a thread of its choosing.
//!
//! # Example
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use tessera_core::{new_instance, EngineConfig};
//!
//! let instance = new_instance(EngineConfig::default()).unwrap();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! instance
//!     .with_hooks(|hooks| {
//!         hooks.set_float_hook(move |source, value| {
//!             sink.lock().unwrap().push((source.to_owned(), value))
//!         })
//!     })
//!     .unwrap();
//!
//! instance.bind("level").unwrap();
//! instance.send_float("level", 0.5).unwrap();
//! instance.drain_control_events().unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![("level".to_string(), 0.5)]);
//! ```

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::{
    EngineConfig, BLOCK_SIZE, DEFAULT_QUEUE_CAPACITY, MAX_CHANNELS, PRINT_LINE_SIZE, SHORT_SCALE,
};

pub mod ring_buffer;
pub use ring_buffer::{Consumer, Producer, RingBuffer, RING_ALIGNMENT};

mod atom;
pub use atom::{Atom, Atoms, Message, MessageBuilder, Symbol};

pub mod wire;
pub use wire::{AtomSlice, WORD_ALIGN};

mod hooks;
pub use hooks::{
    AfterTouchHook, BangHook, ControlChangeHook, FloatHook, HookTable, ListHook, MessageHook,
    MidiByteHook, NoteOnHook, PitchBendHook, PolyAfterTouchHook, PrintConcatenator, PrintHook,
    ProgramChangeHook, SymbolHook,
};

pub mod queue;
pub use queue::{
    control_queue, event_queues, midi_queue, ControlEventConsumer, ControlEventProducer,
    EventQueues, MidiEventConsumer, MidiEventProducer,
};

mod array;
pub use array::Arrays;

mod scheduler;

mod patch;
pub use patch::{Outlet, Patch, TickContext};

mod registry;
pub use registry::{Class, ClassRegistry, Method, MethodContext, INLET_CLASS, RECEIVER_CLASS};

mod instance;
pub use instance::{
    current_instance, free_instance, get_instance, holds_instance_lock, init, main_instance,
    new_instance, num_instances, set_current_instance, this_instance, Instance, InstanceGuard,
    ReceiverHandle,
};

mod process;
pub use process::{block_size, Layout, Sample};

// Re-export the MIDI model so hosts need only one dependency
pub use tessera_midi::{MidiMessage, PortChannel};
