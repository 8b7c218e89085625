//! Free functions acting on the calling thread's current instance.
//!
//! These mirror a flat, handle-free host boundary: call [`init`] once, optionally
//! bind the thread to an instance with [`set_current_instance`], then send, process
//! and drain without passing a handle around. Threads that never set an instance use
//! the main instance created by [`init`].
//!
//! ```
//! use tessera::current;
//!
//! current::init().unwrap();
//! let instance = current::new_instance().unwrap();
//! current::set_current_instance(&instance);
//!
//! current::bind("volume").unwrap();
//! assert!(current::exists("volume").unwrap());
//! assert!(current::note_on(-1, 60, 100).is_err());
//!
//! current::free_instance(&instance).unwrap();
//! ```

use tessera_core::{Atom, EngineConfig, HookTable, Instance, Message, ReceiverHandle};

use crate::{Error, Result};

fn current() -> Result<Instance> {
    tessera_core::current_instance().ok_or(Error::NoInstance)
}

fn tick_count(ticks: i32) -> Result<usize> {
    usize::try_from(ticks).map_err(|_| tessera_core::Error::InvalidTicks(ticks.into()).into())
}

/// Initializes the engine and creates the main instance. Safe to call repeatedly.
pub fn init() -> Result<bool> {
    Ok(tessera_core::init()?)
}

/// Creates an instance with the default configuration.
pub fn new_instance() -> Result<Instance> {
    Ok(tessera_core::new_instance(EngineConfig::default())?)
}

pub fn set_current_instance(instance: &Instance) {
    tessera_core::set_current_instance(instance);
}

pub fn free_instance(instance: &Instance) -> Result<()> {
    Ok(tessera_core::free_instance(instance)?)
}

pub fn this_instance() -> Option<Instance> {
    tessera_core::this_instance()
}

pub fn main_instance() -> Option<Instance> {
    tessera_core::main_instance()
}

pub fn get_instance(index: usize) -> Option<Instance> {
    tessera_core::get_instance(index)
}

pub fn num_instances() -> usize {
    tessera_core::num_instances()
}

pub fn set_verbose(verbose: bool) -> Result<()> {
    Ok(current()?.set_verbose(verbose)?)
}

pub fn bind(name: &str) -> Result<ReceiverHandle> {
    Ok(current()?.bind(name)?)
}

pub fn unbind(handle: ReceiverHandle) -> Result<bool> {
    Ok(current()?.unbind(handle)?)
}

pub fn exists(name: &str) -> Result<bool> {
    Ok(current()?.exists(name)?)
}

pub fn send_bang(name: &str) -> Result<()> {
    Ok(current()?.send_bang(name)?)
}

pub fn send_float(name: &str, value: f32) -> Result<()> {
    Ok(current()?.send_float(name, value)?)
}

pub fn send_symbol(name: &str, symbol: &str) -> Result<()> {
    Ok(current()?.send_symbol(name, symbol)?)
}

pub fn send_list(name: &str, atoms: &[Atom]) -> Result<()> {
    Ok(current()?.send_list(name, atoms)?)
}

pub fn send_message(name: &str, selector: &str, atoms: &[Atom]) -> Result<()> {
    Ok(current()?.send_message(name, selector, atoms)?)
}

pub fn post(name: &str, message: Message) -> Result<bool> {
    Ok(current()?.post(name, message)?)
}

pub fn block_size() -> usize {
    tessera_core::block_size()
}

pub fn init_audio(inputs: usize, outputs: usize, sample_rate: u32) -> Result<()> {
    Ok(current()?.init_audio(inputs, outputs, sample_rate)?)
}

/// Interleaved `f32`. Negative `ticks` is rejected.
pub fn process_float(ticks: i32, input: &[f32], output: &mut [f32]) -> Result<()> {
    let ticks = tick_count(ticks)?;
    Ok(current()?.process_float(ticks, input, output)?)
}

pub fn process_short(ticks: i32, input: &[i16], output: &mut [i16]) -> Result<()> {
    let ticks = tick_count(ticks)?;
    Ok(current()?.process_short(ticks, input, output)?)
}

pub fn process_double(ticks: i32, input: &[f64], output: &mut [f64]) -> Result<()> {
    let ticks = tick_count(ticks)?;
    Ok(current()?.process_double(ticks, input, output)?)
}

pub fn process_raw(input: &[f32], output: &mut [f32]) -> Result<()> {
    Ok(current()?.process_raw(input, output)?)
}

pub fn process_raw_short(input: &[i16], output: &mut [i16]) -> Result<()> {
    Ok(current()?.process_raw_short(input, output)?)
}

pub fn process_raw_double(input: &[f64], output: &mut [f64]) -> Result<()> {
    Ok(current()?.process_raw_double(input, output)?)
}

pub fn note_on(channel: i32, pitch: i32, velocity: i32) -> Result<()> {
    Ok(current()?.note_on(channel, pitch, velocity)?)
}

pub fn control_change(channel: i32, controller: i32, value: i32) -> Result<()> {
    Ok(current()?.control_change(channel, controller, value)?)
}

pub fn program_change(channel: i32, program: i32) -> Result<()> {
    Ok(current()?.program_change(channel, program)?)
}

pub fn pitch_bend(channel: i32, value: i32) -> Result<()> {
    Ok(current()?.pitch_bend(channel, value)?)
}

pub fn after_touch(channel: i32, value: i32) -> Result<()> {
    Ok(current()?.after_touch(channel, value)?)
}

pub fn poly_after_touch(channel: i32, pitch: i32, value: i32) -> Result<()> {
    Ok(current()?.poly_after_touch(channel, pitch, value)?)
}

pub fn midi_byte(port: i32, byte: i32) -> Result<()> {
    Ok(current()?.midi_byte(port, byte)?)
}

pub fn sysex(port: i32, byte: i32) -> Result<()> {
    Ok(current()?.sysex(port, byte)?)
}

pub fn sys_realtime(port: i32, byte: i32) -> Result<()> {
    Ok(current()?.sys_realtime(port, byte)?)
}

pub fn with_hooks<R>(f: impl FnOnce(&mut HookTable) -> R) -> Result<R> {
    Ok(current()?.with_hooks(f)?)
}

pub fn drain_control_events() -> Result<usize> {
    Ok(current()?.drain_control_events()?)
}

pub fn drain_midi_events() -> Result<usize> {
    Ok(current()?.drain_midi_events()?)
}

pub fn create_array(name: &str, size: usize) -> Result<()> {
    Ok(current()?.create_array(name, size)?)
}

pub fn array_size(name: &str) -> Result<usize> {
    Ok(current()?.array_size(name)?)
}

pub fn resize_array(name: &str, size: usize) -> Result<()> {
    Ok(current()?.resize_array(name, size)?)
}

pub fn read_array(dest: &mut [f32], name: &str, offset: usize) -> Result<()> {
    Ok(current()?.read_array(dest, name, offset)?)
}

pub fn write_array(name: &str, offset: usize, src: &[f32]) -> Result<()> {
    Ok(current()?.write_array(name, offset, src)?)
}
