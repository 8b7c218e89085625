//! Builder for configuring and constructing an `Engine`.

use tessera_core::{new_instance, EngineConfig, HookTable, Patch};
use tracing::debug;

use crate::{Engine, Result};

/// Every setting defaults to [`EngineConfig::default`]. Building validates the
/// configuration and creates a fresh instance.
///
/// # Example
///
/// ```
/// use tessera::prelude::*;
///
/// let engine = Engine::builder()
///     .sample_rate(48000)
///     .inputs(1)
///     .outputs(2)
///     .queue_capacity(4096)
///     .build()
///     .unwrap();
///
/// assert_eq!(engine.sample_rate().unwrap(), 48000);
/// ```
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    patch: Option<Box<dyn Patch>>,
    hooks: Option<HookTable>,
    verbose: bool,
    make_current: bool,
}

impl EngineBuilder {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 44100
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Default: 2
    pub fn inputs(mut self, count: usize) -> Self {
        self.config.input_channels = count;
        self
    }

    /// Default: 2
    pub fn outputs(mut self, count: usize) -> Self {
        self.config.output_channels = count;
        self
    }

    /// Bytes per event queue, a multiple of 256. Default: 16384
    pub fn queue_capacity(mut self, bytes: usize) -> Self {
        self.config.queue_capacity = bytes;
        self
    }

    /// Default: 1024
    pub fn max_pending_messages(mut self, count: usize) -> Self {
        self.config.max_pending_messages = count;
        self
    }

    pub fn patch(mut self, patch: impl Patch + 'static) -> Self {
        self.patch = Some(Box::new(patch));
        self
    }

    pub fn hooks(mut self, hooks: HookTable) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Makes the engine the building thread's current instance.
    pub fn make_current(mut self) -> Self {
        self.make_current = true;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let instance = new_instance(self.config)?;
        let engine = Engine::from_instance(instance);

        if let Some(hooks) = self.hooks {
            engine.instance().set_hooks(hooks)?;
        }
        if self.verbose {
            engine.set_verbose(true)?;
        }
        if let Some(patch) = self.patch {
            engine.instance().load_patch(patch)?;
        }
        if self.make_current {
            engine.make_current();
        }
        debug!(instance = engine.instance().id(), "engine built");
        Ok(engine)
    }
}
