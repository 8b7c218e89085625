//! Test helpers and fixtures for tessera integration tests
//!
//! Provides a recording hook table, a few small patches and buffer generators.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tessera::prelude::*;
use tessera::{MidiMessage, Symbol};

/// Default test sample rate
pub const TEST_SAMPLE_RATE: u32 = 48000;

/// One 16-bit quantization step, as seen after a round trip through the engine.
pub const SHORT_EPSILON: f32 = 1.0 / 32767.0;

/// Everything a hook can observe, owned.
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    Print(String),
    Bang(String),
    Float(String, f32),
    Symbol(String, String),
    List(String, Vec<Atom>),
    Message(String, String, Vec<Atom>),
    NoteOn(i32, i32, i32),
    ControlChange(i32, i32, i32),
    ProgramChange(i32, i32),
    PitchBend(i32, i32),
    AfterTouch(i32, i32),
    PolyAfterTouch(i32, i32, i32),
    MidiByte(i32, i32),
}

/// Shared log written by [`recording_hooks`].
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    fn sink(&self) -> impl FnMut(Recorded) + Send + 'static {
        let events = self.events.clone();
        move |event| events.lock().unwrap().push(event)
    }

    pub fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

/// A hook table with every hook recording into one ordered log.
pub fn recording_hooks() -> (HookTable, Recorder) {
    let recorder = Recorder::default();
    let mut hooks = HookTable::new();

    let mut sink = recorder.sink();
    hooks.set_print_hook(move |text| sink(Recorded::Print(text.to_owned())));
    let mut sink = recorder.sink();
    hooks.set_bang_hook(move |src| sink(Recorded::Bang(src.to_owned())));
    let mut sink = recorder.sink();
    hooks.set_float_hook(move |src, v| sink(Recorded::Float(src.to_owned(), v)));
    let mut sink = recorder.sink();
    hooks.set_symbol_hook(move |src, s| sink(Recorded::Symbol(src.to_owned(), s.to_owned())));
    let mut sink = recorder.sink();
    hooks.set_list_hook(move |src, atoms| sink(Recorded::List(src.to_owned(), atoms.to_vec())));
    let mut sink = recorder.sink();
    hooks.set_message_hook(move |src, sel, atoms| {
        sink(Recorded::Message(src.to_owned(), sel.to_owned(), atoms.to_vec()))
    });

    let mut sink = recorder.sink();
    hooks.set_note_on_hook(move |ch, p, v| sink(Recorded::NoteOn(ch, p, v)));
    let mut sink = recorder.sink();
    hooks.set_control_change_hook(move |ch, c, v| sink(Recorded::ControlChange(ch, c, v)));
    let mut sink = recorder.sink();
    hooks.set_program_change_hook(move |ch, p| sink(Recorded::ProgramChange(ch, p)));
    let mut sink = recorder.sink();
    hooks.set_pitch_bend_hook(move |ch, v| sink(Recorded::PitchBend(ch, v)));
    let mut sink = recorder.sink();
    hooks.set_after_touch_hook(move |ch, v| sink(Recorded::AfterTouch(ch, v)));
    let mut sink = recorder.sink();
    hooks.set_poly_after_touch_hook(move |ch, p, v| sink(Recorded::PolyAfterTouch(ch, p, v)));
    let mut sink = recorder.sink();
    hooks.set_midi_byte_hook(move |port, b| sink(Recorded::MidiByte(port, b)));

    (hooks, recorder)
}

/// Routes engine logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Stereo in, stereo out engine with recording hooks installed.
pub fn test_engine() -> (Engine, Recorder) {
    init_tracing();
    let (hooks, recorder) = recording_hooks();
    let engine = Engine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .inputs(2)
        .outputs(2)
        .hooks(hooks)
        .build()
        .expect("Failed to create test engine");
    (engine, recorder)
}

/// Multiplies every input channel by a gain set on the `gain` inlet.
pub struct GainPatch {
    pub gain: f32,
}

impl Patch for GainPatch {
    fn inlets(&self) -> Vec<String> {
        vec!["gain".into()]
    }

    fn receive(&mut self, _inlet: &str, message: &Message, _out: &mut Outlet<'_>) {
        if let Message::Float(gain) = message {
            self.gain = *gain;
        }
    }

    fn process(&mut self, ctx: &mut TickContext<'_>) {
        let channels = ctx.input_channels().min(ctx.output_channels());
        for channel in 0..channels {
            let gain = self.gain;
            let (input, output) = ctx.io(channel, channel);
            for (o, i) in output.iter_mut().zip(input) {
                *o = i * gain;
            }
        }
    }
}

/// Sends whatever arrives on `echo` to `out`, echoes MIDI back out and prints
/// symbols arriving on `say` in two fragments. `later` schedules a bang to `out`.
pub struct EchoPatch {
    out: Symbol,
}

impl EchoPatch {
    pub fn new() -> Self {
        Self {
            out: Symbol::new("out"),
        }
    }
}

impl Patch for EchoPatch {
    fn inlets(&self) -> Vec<String> {
        vec!["echo".into(), "say".into(), "later".into()]
    }

    fn receive(&mut self, inlet: &str, message: &Message, out: &mut Outlet<'_>) {
        match inlet {
            "echo" => {
                out.send(self.out, message.clone());
            }
            "say" => {
                if let Message::Symbol(word) = message {
                    out.print(word.as_str());
                    out.print(" done\n");
                }
            }
            "later" => {
                out.schedule(3, self.out, Message::Bang);
            }
            _ => {}
        }
    }

    fn midi_in(&mut self, message: MidiMessage, out: &mut Outlet<'_>) {
        out.midi_out(message);
    }

    fn process(&mut self, _ctx: &mut TickContext<'_>) {}
}

/// Bangs `tick` once per rendered tick.
pub struct TickerPatch {
    tick: Symbol,
}

impl TickerPatch {
    pub fn new() -> Self {
        Self {
            tick: Symbol::new("tick"),
        }
    }
}

impl Patch for TickerPatch {
    fn receive(&mut self, _inlet: &str, _message: &Message, _out: &mut Outlet<'_>) {}

    fn process(&mut self, ctx: &mut TickContext<'_>) {
        ctx.outlet().send(self.tick, Message::Bang);
    }
}

/// Interleaved buffer with every sample set to `value`.
pub fn constant(value: f32, channels: usize, ticks: usize) -> Vec<f32> {
    vec![value; channels * ticks * tessera::BLOCK_SIZE]
}
