//! The seam between the bridge and the dataflow graph it drives.
//!
//! A [`Patch`] is whatever the host loads into an instance. It receives messages on the
//! names it binds, receives injected MIDI, and renders audio one tick at a time. It acts
//! on the outside world only through an [`Outlet`].

use std::collections::VecDeque;

use tessera_midi::MidiMessage;

use crate::array::Arrays;
use crate::atom::{Message, Symbol};
use crate::config::BLOCK_SIZE;
use crate::queue::{ControlEventProducer, MidiEventProducer};
use crate::scheduler::Scheduler;

/// A dataflow graph loaded into an instance.
///
/// Every method runs with the instance lock held, on whichever thread called into
/// the instance.
pub trait Patch: Send {
    /// Names this patch listens on. Bound when the patch is loaded.
    fn inlets(&self) -> Vec<String> {
        Vec::new()
    }

    /// A message arrived on one of the patch's inlets.
    fn receive(&mut self, inlet: &str, message: &Message, out: &mut Outlet<'_>);

    /// MIDI injected by the host.
    fn midi_in(&mut self, _message: MidiMessage, _out: &mut Outlet<'_>) {}

    /// Renders one tick of [`BLOCK_SIZE`] frames.
    fn process(&mut self, ctx: &mut TickContext<'_>);
}

/// Messages waiting to be dispatched once the current call returns.
pub(crate) struct PendingMessages {
    queue: VecDeque<(Symbol, Message)>,
    capacity: usize,
    dropped: usize,
}

impl PendingMessages {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn push(&mut self, name: Symbol, message: Message) -> bool {
        if self.queue.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.queue.push_back((name, message));
        true
    }

    pub fn pop(&mut self) -> Option<(Symbol, Message)> {
        self.queue.pop_front()
    }

    pub fn take_dropped(&mut self) -> usize {
        std::mem::take(&mut self.dropped)
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Everything patch code may do besides touching its own state.
pub struct Outlet<'a> {
    pub(crate) control: &'a mut ControlEventProducer,
    pub(crate) midi: &'a mut MidiEventProducer,
    pub(crate) pending: &'a mut PendingMessages,
    pub(crate) scheduler: &'a mut Scheduler,
}

impl Outlet<'_> {
    /// Sends `message` to every receiver bound to `name`.
    ///
    /// Delivery is deferred until the current call returns, in send order. Returns
    /// `false` if too many messages are already waiting. Intern `name` ahead of time:
    /// [`Symbol::new`] may lock and allocate.
    pub fn send(&mut self, name: Symbol, message: Message) -> bool {
        self.pending.push(name, message)
    }

    /// Queues text for the print hook. Lines should end with `'\n'`.
    pub fn print(&mut self, text: &str) -> bool {
        self.control.print(text)
    }

    /// Queues MIDI output. Values are clamped into range.
    pub fn midi_out(&mut self, message: MidiMessage) -> bool {
        self.midi.push(&message)
    }

    /// Sends `message` to `name` after `delay_ticks` ticks.
    pub fn schedule(&mut self, delay_ticks: u64, name: Symbol, message: Message) -> bool {
        self.scheduler.schedule(delay_ticks, name, message)
    }

    /// Current logical time in ticks.
    pub fn now(&self) -> u64 {
        self.scheduler.ticks()
    }

    /// Forwards `message` to the host as a control event from `source`.
    pub(crate) fn forward(&mut self, source: Symbol, message: &Message) -> bool {
        self.control.push(source, message)
    }
}

/// One tick of audio plus the instance resources a patch may use while rendering.
///
/// Buffers are planar: channel `c` occupies `c * BLOCK_SIZE..(c + 1) * BLOCK_SIZE`.
pub struct TickContext<'a> {
    pub(crate) input: &'a [f32],
    pub(crate) output: &'a mut [f32],
    pub(crate) sample_rate: u32,
    pub(crate) arrays: &'a mut Arrays,
    pub(crate) outlet: Outlet<'a>,
}

impl<'a> TickContext<'a> {
    pub fn input_channels(&self) -> usize {
        self.input.len() / BLOCK_SIZE
    }

    pub fn output_channels(&self) -> usize {
        self.output.len() / BLOCK_SIZE
    }

    pub fn input(&self, channel: usize) -> &[f32] {
        &self.input[channel * BLOCK_SIZE..(channel + 1) * BLOCK_SIZE]
    }

    /// Output block for `channel`. Zeroed at the start of every tick.
    pub fn output(&mut self, channel: usize) -> &mut [f32] {
        &mut self.output[channel * BLOCK_SIZE..(channel + 1) * BLOCK_SIZE]
    }

    /// Input and output blocks together, for in-place style processing.
    pub fn io(&mut self, input: usize, output: usize) -> (&[f32], &mut [f32]) {
        (
            &self.input[input * BLOCK_SIZE..(input + 1) * BLOCK_SIZE],
            &mut self.output[output * BLOCK_SIZE..(output + 1) * BLOCK_SIZE],
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Index of this tick. The first tick an instance processes is 1.
    pub fn tick(&self) -> u64 {
        self.outlet.now()
    }

    pub fn array(&self, name: Symbol) -> Option<&[f32]> {
        self.arrays.get(name)
    }

    pub fn array_mut(&mut self, name: Symbol) -> Option<&mut [f32]> {
        self.arrays.get_mut(name)
    }

    pub fn outlet(&mut self) -> &mut Outlet<'a> {
        &mut self.outlet
    }
}
