//! Engine: an owned instance with a convenient host-facing API.

use tessera_core::{
    free_instance, Atom, EngineConfig, HookTable, Instance, Layout, Message, Patch,
    ReceiverHandle, Sample,
};
use tracing::{debug, warn};

use crate::Result;

/// One engine instance, freed when dropped.
///
/// All methods take `&self`, so an `Engine` can be shared between the audio thread
/// (processing) and a host thread (messages, draining) behind an `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use tessera::prelude::*;
///
/// let engine = Engine::builder().inputs(0).outputs(2).build().unwrap();
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// engine.hooks(|hooks| hooks.set_bang_hook(move |src| sink.lock().unwrap().push(src.to_owned())))
///     .unwrap();
///
/// engine.bind("tick").unwrap();
/// engine.send_bang("tick").unwrap();
///
/// let mut output = vec![0.0f32; 2 * engine.block_size()];
/// engine.process_float(1, &[], &mut output).unwrap();
///
/// engine.poll().unwrap();
/// assert_eq!(*seen.lock().unwrap(), vec!["tick".to_string()]);
/// ```
pub struct Engine {
    instance: Instance,
}

impl Engine {
    pub fn builder() -> crate::EngineBuilder {
        crate::EngineBuilder::default()
    }

    pub(crate) fn from_instance(instance: Instance) -> Self {
        Self { instance }
    }

    /// The underlying instance handle.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Makes this engine the calling thread's current instance.
    pub fn make_current(&self) {
        self.instance.make_current();
    }

    pub fn config(&self) -> Result<EngineConfig> {
        Ok(self.instance.config()?)
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        tessera_core::block_size()
    }

    pub fn sample_rate(&self) -> Result<u32> {
        Ok(self.config()?.sample_rate)
    }

    // =========================================================================
    // Patch
    // =========================================================================

    pub fn load_patch(&self, patch: impl Patch + 'static) -> Result<()> {
        Ok(self.instance.load_patch(Box::new(patch))?)
    }

    pub fn close_patch(&self) -> Result<()> {
        Ok(self.instance.close_patch()?)
    }

    // =========================================================================
    // Receivers and messages
    // =========================================================================

    pub fn bind(&self, name: &str) -> Result<ReceiverHandle> {
        Ok(self.instance.bind(name)?)
    }

    pub fn unbind(&self, handle: ReceiverHandle) -> Result<bool> {
        Ok(self.instance.unbind(handle)?)
    }

    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.instance.exists(name)?)
    }

    pub fn send(&self, name: &str, message: Message) -> Result<()> {
        Ok(self.instance.send(name, message)?)
    }

    pub fn send_bang(&self, name: &str) -> Result<()> {
        Ok(self.instance.send_bang(name)?)
    }

    pub fn send_float(&self, name: &str, value: f32) -> Result<()> {
        Ok(self.instance.send_float(name, value)?)
    }

    pub fn send_symbol(&self, name: &str, symbol: &str) -> Result<()> {
        Ok(self.instance.send_symbol(name, symbol)?)
    }

    pub fn send_list(&self, name: &str, atoms: &[Atom]) -> Result<()> {
        Ok(self.instance.send_list(name, atoms)?)
    }

    pub fn send_message(&self, name: &str, selector: &str, atoms: &[Atom]) -> Result<()> {
        Ok(self.instance.send_message(name, selector, atoms)?)
    }

    /// Queues a message for the next processing call without locking the engine.
    pub fn post(&self, name: &str, message: Message) -> Result<bool> {
        Ok(self.instance.post(name, message)?)
    }

    // =========================================================================
    // MIDI input
    // =========================================================================

    pub fn note_on(&self, channel: i32, pitch: i32, velocity: i32) -> Result<()> {
        Ok(self.instance.note_on(channel, pitch, velocity)?)
    }

    pub fn control_change(&self, channel: i32, controller: i32, value: i32) -> Result<()> {
        Ok(self.instance.control_change(channel, controller, value)?)
    }

    pub fn program_change(&self, channel: i32, program: i32) -> Result<()> {
        Ok(self.instance.program_change(channel, program)?)
    }

    pub fn pitch_bend(&self, channel: i32, value: i32) -> Result<()> {
        Ok(self.instance.pitch_bend(channel, value)?)
    }

    pub fn after_touch(&self, channel: i32, value: i32) -> Result<()> {
        Ok(self.instance.after_touch(channel, value)?)
    }

    pub fn poly_after_touch(&self, channel: i32, pitch: i32, value: i32) -> Result<()> {
        Ok(self.instance.poly_after_touch(channel, pitch, value)?)
    }

    pub fn midi_byte(&self, port: i32, byte: i32) -> Result<()> {
        Ok(self.instance.midi_byte(port, byte)?)
    }

    pub fn sysex(&self, port: i32, byte: i32) -> Result<()> {
        Ok(self.instance.sysex(port, byte)?)
    }

    pub fn sys_realtime(&self, port: i32, byte: i32) -> Result<()> {
        Ok(self.instance.sys_realtime(port, byte)?)
    }

    // =========================================================================
    // Audio
    // =========================================================================

    pub fn process<S: Sample>(
        &self,
        ticks: usize,
        input: &[S],
        output: &mut [S],
        layout: Layout,
    ) -> Result<()> {
        Ok(self.instance.process(ticks, input, output, layout)?)
    }

    pub fn process_float(&self, ticks: usize, input: &[f32], output: &mut [f32]) -> Result<()> {
        Ok(self.instance.process_float(ticks, input, output)?)
    }

    pub fn process_short(&self, ticks: usize, input: &[i16], output: &mut [i16]) -> Result<()> {
        Ok(self.instance.process_short(ticks, input, output)?)
    }

    pub fn process_double(&self, ticks: usize, input: &[f64], output: &mut [f64]) -> Result<()> {
        Ok(self.instance.process_double(ticks, input, output)?)
    }

    pub fn process_raw(&self, input: &[f32], output: &mut [f32]) -> Result<()> {
        Ok(self.instance.process_raw(input, output)?)
    }

    pub fn init_audio(&self, inputs: usize, outputs: usize, sample_rate: u32) -> Result<()> {
        Ok(self.instance.init_audio(inputs, outputs, sample_rate)?)
    }

    // =========================================================================
    // Hooks and draining
    // =========================================================================

    /// Runs `f` on the hook table. Don't call while a drain runs on another thread
    /// if ordering of hook changes matters.
    pub fn hooks<R>(&self, f: impl FnOnce(&mut HookTable) -> R) -> Result<R> {
        Ok(self.instance.with_hooks(f)?)
    }

    pub fn drain_control_events(&self) -> Result<usize> {
        Ok(self.instance.drain_control_events()?)
    }

    pub fn drain_midi_events(&self) -> Result<usize> {
        Ok(self.instance.drain_midi_events()?)
    }

    /// Drains both queues. Returns the total number of events dispatched.
    ///
    /// Calling this from one of the engine's own hooks fails with `InstanceBusy`.
    pub fn poll(&self) -> Result<usize> {
        Ok(self.drain_control_events()? + self.drain_midi_events()?)
    }

    /// Events lost to full queues since creation, `(control, midi)`. Takes no lock.
    pub fn dropped_events(&self) -> (usize, usize) {
        (
            self.instance.dropped_control_events(),
            self.instance.dropped_midi_events(),
        )
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    pub fn create_array(&self, name: &str, size: usize) -> Result<()> {
        Ok(self.instance.create_array(name, size)?)
    }

    pub fn array_size(&self, name: &str) -> Result<usize> {
        Ok(self.instance.array_size(name)?)
    }

    pub fn resize_array(&self, name: &str, size: usize) -> Result<()> {
        Ok(self.instance.resize_array(name, size)?)
    }

    pub fn read_array(&self, dest: &mut [f32], name: &str, offset: usize) -> Result<()> {
        Ok(self.instance.read_array(dest, name, offset)?)
    }

    pub fn write_array(&self, name: &str, offset: usize, src: &[f32]) -> Result<()> {
        Ok(self.instance.write_array(name, offset, src)?)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    pub fn set_verbose(&self, verbose: bool) -> Result<()> {
        Ok(self.instance.set_verbose(verbose)?)
    }

    pub fn ticks(&self) -> Result<u64> {
        Ok(self.instance.ticks()?)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        match free_instance(&self.instance) {
            Ok(()) => debug!(instance = self.instance.id(), "engine dropped"),
            Err(tessera_core::Error::InstanceFreed) => {}
            Err(err) => warn!(instance = self.instance.id(), %err, "engine instance not freed"),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("instance", &self.instance)
            .finish()
    }
}
