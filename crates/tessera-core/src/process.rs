//! Block processing: host buffers in, ticks of the patch, host buffers out.
//!
//! A call processes a whole number of ticks of [`BLOCK_SIZE`] frames. For each tick
//! the input is converted into the engine's planar `f32` buffers, the output buffers
//! are zeroed, the scheduler advances one tick (firing due timers and running the
//! patch), and the output is converted back into the caller's format and layout.

use crate::config::{EngineConfig, BLOCK_SIZE, SHORT_SCALE};
use crate::instance::{dispatch, flush_pending, poll_mailbox, AudioBuffers, EngineState, Instance};
use crate::patch::{Outlet, TickContext};
use crate::registry::ClassRegistry;
use crate::{Error, Result};

/// Frames per tick.
#[inline]
pub const fn block_size() -> usize {
    BLOCK_SIZE
}

/// A host sample format.
pub trait Sample: Copy + Send + 'static {
    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

impl Sample for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        value
    }
}

impl Sample for f64 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        f64::from(value)
    }
}

/// 16-bit samples scale by [`SHORT_SCALE`]. Output outside `-1.0..=1.0` saturates.
impl Sample for i16 {
    #[inline]
    fn to_f32(self) -> f32 {
        f32::from(self) / SHORT_SCALE
    }

    #[inline]
    fn from_f32(value: f32) -> Self {
        (value * SHORT_SCALE) as i16
    }
}

/// Arrangement of channels in a host buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Frame by frame: `[l0, r0, l1, r1, ...]`.
    Interleaved,
    /// Channel by channel, each channel contiguous for the whole call.
    Planar,
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if actual < expected {
        return Err(Error::BufferTooSmall { expected, actual });
    }
    Ok(())
}

/// Checks both buffers against `frames` frames of `channels`. A sample count that
/// does not fit in `usize` is reported as an invalid tick count.
fn check_lengths(
    ticks: usize,
    frames: usize,
    (in_ch, out_ch): (usize, usize),
    input: usize,
    output: usize,
) -> Result<()> {
    let samples = |channels: usize| {
        frames
            .checked_mul(channels)
            .ok_or(Error::InvalidTicks(ticks as i64))
    };
    check_len(samples(in_ch)?, input)?;
    check_len(samples(out_ch)?, output)
}

fn read_input<S: Sample>(
    input: &[S],
    engine: &mut [f32],
    channels: usize,
    tick: usize,
    ticks: usize,
    layout: Layout,
) {
    let total_frames = ticks * BLOCK_SIZE;
    for channel in 0..channels {
        let block = &mut engine[channel * BLOCK_SIZE..(channel + 1) * BLOCK_SIZE];
        for (frame, sample) in block.iter_mut().enumerate() {
            let index = match layout {
                Layout::Interleaved => (tick * BLOCK_SIZE + frame) * channels + channel,
                Layout::Planar => channel * total_frames + tick * BLOCK_SIZE + frame,
            };
            *sample = input[index].to_f32();
        }
    }
}

fn write_output<S: Sample>(
    engine: &[f32],
    output: &mut [S],
    channels: usize,
    tick: usize,
    ticks: usize,
    layout: Layout,
) {
    let total_frames = ticks * BLOCK_SIZE;
    for channel in 0..channels {
        let block = &engine[channel * BLOCK_SIZE..(channel + 1) * BLOCK_SIZE];
        for (frame, &sample) in block.iter().enumerate() {
            let index = match layout {
                Layout::Interleaved => (tick * BLOCK_SIZE + frame) * channels + channel,
                Layout::Planar => channel * total_frames + tick * BLOCK_SIZE + frame,
            };
            output[index] = S::from_f32(sample);
        }
    }
}

/// Advances the scheduler one tick: due timers, then the patch, then whatever they sent.
fn run_tick(registry: &ClassRegistry, state: &mut EngineState) {
    state.scheduler.advance();
    while let Some((name, message)) = state.scheduler.pop_due() {
        dispatch(registry, state, name, &message);
        flush_pending(registry, state);
    }

    if let Some(patch) = state.patch.as_mut() {
        let mut ctx = TickContext {
            input: &state.audio.input,
            output: &mut state.audio.output,
            sample_rate: state.config.sample_rate,
            arrays: &mut state.arrays,
            outlet: Outlet {
                control: &mut state.control,
                midi: &mut state.midi,
                pending: &mut state.pending,
                scheduler: &mut state.scheduler,
            },
        };
        patch.process(&mut ctx);
    }
    flush_pending(registry, state);
}

impl Instance {
    /// Processes `ticks` ticks of audio.
    ///
    /// `input` must hold `ticks * block_size() * input_channels` samples and `output`
    /// the matching output count. Lengths are checked before the instance is locked.
    /// Input is not clipped.
    pub fn process<S: Sample>(
        &self,
        ticks: usize,
        input: &[S],
        output: &mut [S],
        layout: Layout,
    ) -> Result<()> {
        let frames = ticks
            .checked_mul(BLOCK_SIZE)
            .ok_or(Error::InvalidTicks(ticks as i64))?;
        let (in_ch, out_ch) = self.channels();
        check_lengths(ticks, frames, (in_ch, out_ch), input.len(), output.len())?;

        let mut guard = self.lock()?;
        let (registry, state) = guard.parts();
        let (in_ch, out_ch) = (state.config.input_channels, state.config.output_channels);
        // Channel counts may have changed while we waited for the lock.
        check_lengths(ticks, frames, (in_ch, out_ch), input.len(), output.len())?;

        poll_mailbox(registry, state);
        for tick in 0..ticks {
            read_input(input, &mut state.audio.input, in_ch, tick, ticks, layout);
            state.audio.output.fill(0.0);
            run_tick(registry, state);
            write_output(&state.audio.output, output, out_ch, tick, ticks, layout);
        }
        Ok(())
    }

    /// Interleaved `f32`.
    pub fn process_float(&self, ticks: usize, input: &[f32], output: &mut [f32]) -> Result<()> {
        self.process(ticks, input, output, Layout::Interleaved)
    }

    /// Interleaved 16-bit.
    pub fn process_short(&self, ticks: usize, input: &[i16], output: &mut [i16]) -> Result<()> {
        self.process(ticks, input, output, Layout::Interleaved)
    }

    /// Interleaved `f64`.
    pub fn process_double(&self, ticks: usize, input: &[f64], output: &mut [f64]) -> Result<()> {
        self.process(ticks, input, output, Layout::Interleaved)
    }

    /// One tick, planar `f32`.
    pub fn process_raw(&self, input: &[f32], output: &mut [f32]) -> Result<()> {
        self.process(1, input, output, Layout::Planar)
    }

    /// One tick, planar 16-bit.
    pub fn process_raw_short(&self, input: &[i16], output: &mut [i16]) -> Result<()> {
        self.process(1, input, output, Layout::Planar)
    }

    /// One tick, planar `f64`.
    pub fn process_raw_double(&self, input: &[f64], output: &mut [f64]) -> Result<()> {
        self.process(1, input, output, Layout::Planar)
    }

    /// Reconfigures channel counts and sample rate. Internal buffers are reallocated.
    pub fn init_audio(
        &self,
        input_channels: usize,
        output_channels: usize,
        sample_rate: u32,
    ) -> Result<()> {
        let mut guard = self.lock()?;
        let (_, state) = guard.parts();
        let config = EngineConfig {
            input_channels,
            output_channels,
            sample_rate,
            ..state.config.clone()
        };
        config.validate()?;
        state.audio = AudioBuffers::new(input_channels, output_channels);
        state.config = config;
        self.publish_channels(input_channels, output_channels);
        tracing::debug!(
            instance = self.id(),
            input_channels,
            output_channels,
            sample_rate,
            "audio initialized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{Message, Symbol};
    use crate::instance::new_instance;
    use crate::patch::Patch;
    use approx::assert_abs_diff_eq;

    /// Copies input channel 0 to every output, scaled by a gain set through "gain".
    struct Gain {
        gain: f32,
    }

    impl Patch for Gain {
        fn inlets(&self) -> Vec<String> {
            vec!["gain".into()]
        }

        fn receive(&mut self, _: &str, message: &Message, _: &mut Outlet<'_>) {
            if let Message::Float(g) = message {
                self.gain = *g;
            }
        }

        fn process(&mut self, ctx: &mut TickContext<'_>) {
            for channel in 0..ctx.output_channels() {
                let (input, output) = ctx.io(0, channel);
                for (o, i) in output.iter_mut().zip(input) {
                    *o = i * self.gain;
                }
            }
        }
    }

    fn gain_instance(input_channels: usize, output_channels: usize) -> Instance {
        let inst = new_instance(EngineConfig {
            input_channels,
            output_channels,
            ..Default::default()
        })
        .unwrap();
        inst.load_patch(Box::new(Gain { gain: 1.0 })).unwrap();
        inst
    }

    #[test]
    fn test_block_size() {
        assert_eq!(block_size(), 64);
    }

    #[test]
    fn test_short_conversion() {
        assert_abs_diff_eq!(i16::MAX.to_f32(), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!((-16384i16).to_f32(), -0.50002, epsilon = 1e-4);
        assert_eq!(i16::from_f32(0.5), 16383);
        assert_eq!(i16::from_f32(4.0), i16::MAX);
        assert_eq!(i16::from_f32(-4.0), i16::MIN);
    }

    #[test]
    fn test_silence_in_silence_out() {
        let inst = new_instance(EngineConfig::default()).unwrap();
        let input = vec![0.0f32; 2 * BLOCK_SIZE];
        let mut output = vec![1.0f32; 2 * BLOCK_SIZE];
        inst.process_float(1, &input, &mut output).unwrap();
        assert!(output.iter().all(|&s| s == 0.0));
        assert_eq!(inst.drain_control_events().unwrap(), 0);
        assert_eq!(inst.drain_midi_events().unwrap(), 0);
    }

    #[test]
    fn test_short_buffers_rejected_before_processing() {
        let inst = new_instance(EngineConfig::default()).unwrap();
        let input = vec![0.0f32; 2 * BLOCK_SIZE];
        let mut output = vec![0.0f32; BLOCK_SIZE];
        let err = inst.process_float(1, &input, &mut output).unwrap_err();
        assert_eq!(
            err,
            Error::BufferTooSmall {
                expected: 2 * BLOCK_SIZE,
                actual: BLOCK_SIZE
            }
        );
        assert_eq!(inst.ticks().unwrap(), 0);
    }

    #[test]
    fn test_huge_tick_count_is_rejected() {
        let inst = new_instance(EngineConfig::default()).unwrap();
        let err = inst.process_float(1usize << 57, &[], &mut []).unwrap_err();
        assert!(matches!(err, Error::InvalidTicks(_)));
        assert_eq!(err.status(), -1);

        let err = inst.process_float(usize::MAX, &[], &mut []).unwrap_err();
        assert!(matches!(err, Error::InvalidTicks(_)));
        assert_eq!(inst.ticks().unwrap(), 0);
    }

    #[test]
    fn test_interleaved_gain() {
        let inst = gain_instance(1, 2);
        inst.send_float("gain", 0.5).unwrap();

        let input: Vec<f32> = (0..2 * BLOCK_SIZE).map(|i| i as f32).collect();
        let mut output = vec![0.0f32; 4 * BLOCK_SIZE];
        inst.process_float(2, &input, &mut output).unwrap();

        for frame in 0..2 * BLOCK_SIZE {
            assert_abs_diff_eq!(output[frame * 2], frame as f32 * 0.5);
            assert_abs_diff_eq!(output[frame * 2 + 1], frame as f32 * 0.5);
        }
        assert_eq!(inst.ticks().unwrap(), 2);
    }

    #[test]
    fn test_planar_layout_spans_the_call() {
        let inst = gain_instance(2, 2);
        let ticks = 2;
        let frames = ticks * BLOCK_SIZE;
        // Channel 0 ramps, channel 1 is ignored by the patch.
        let mut input = vec![0.0f64; 2 * frames];
        for (i, s) in input[..frames].iter_mut().enumerate() {
            *s = i as f64 / 1000.0;
        }
        input[frames..].fill(9.0);
        let mut output = vec![0.0f64; 2 * frames];
        inst.process(ticks, &input, &mut output, Layout::Planar).unwrap();

        for i in 0..frames {
            assert_abs_diff_eq!(output[i], i as f64 / 1000.0, epsilon = 1e-6);
            assert_abs_diff_eq!(output[frames + i], i as f64 / 1000.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_process_raw_short() {
        let inst = gain_instance(1, 1);
        let input = vec![i16::MAX / 2; BLOCK_SIZE];
        let mut output = vec![0i16; BLOCK_SIZE];
        inst.process_raw_short(&input, &mut output).unwrap();
        assert!(output.iter().all(|&s| (s - i16::MAX / 2).abs() <= 1));
    }

    #[test]
    fn test_posted_messages_arrive_at_next_process() {
        let inst = gain_instance(1, 1);
        assert!(inst.post("gain", Message::Float(0.0)).unwrap());

        let input = vec![1.0f32; BLOCK_SIZE];
        let mut output = vec![1.0f32; BLOCK_SIZE];
        inst.process_raw(&input, &mut output).unwrap();
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_scheduled_message_fires_on_later_tick() {
        struct Delayed {
            fire: Symbol,
            fired_at: Option<u64>,
        }
        impl Patch for Delayed {
            fn inlets(&self) -> Vec<String> {
                vec!["arm".into(), "fire".into()]
            }
            fn receive(&mut self, inlet: &str, _: &Message, out: &mut Outlet<'_>) {
                match inlet {
                    "arm" => {
                        out.schedule(3, self.fire, Message::Bang);
                    }
                    _ => {
                        self.fired_at = Some(out.now());
                        out.print("fired\n");
                    }
                }
            }
            fn process(&mut self, _: &mut TickContext<'_>) {}
        }

        let inst = new_instance(EngineConfig {
            input_channels: 0,
            output_channels: 0,
            ..Default::default()
        })
        .unwrap();
        inst.load_patch(Box::new(Delayed {
            fire: Symbol::new("fire"),
            fired_at: None,
        }))
        .unwrap();
        let lines = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = lines.clone();
        inst.with_hooks(|h| h.set_concatenated_print_hook(move |s| sink.lock().unwrap().push(s.to_owned())))
            .unwrap();

        inst.send_bang("arm").unwrap();
        inst.process_float(2, &[], &mut []).unwrap();
        inst.drain_control_events().unwrap();
        assert!(lines.lock().unwrap().is_empty());

        inst.process_float(1, &[], &mut []).unwrap();
        inst.drain_control_events().unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["fired"]);
    }

    #[test]
    fn test_patch_reads_array_while_rendering() {
        struct Table {
            table: Symbol,
        }
        impl Patch for Table {
            fn receive(&mut self, _: &str, _: &Message, _: &mut Outlet<'_>) {}
            fn process(&mut self, ctx: &mut TickContext<'_>) {
                let value = ctx.array(self.table).map_or(-1.0, |t| t[0]);
                ctx.output(0).fill(value);
            }
        }

        let inst = new_instance(EngineConfig {
            input_channels: 0,
            output_channels: 1,
            ..Default::default()
        })
        .unwrap();
        inst.load_patch(Box::new(Table {
            table: Symbol::new("render-table"),
        }))
        .unwrap();

        let mut output = vec![0.0f32; BLOCK_SIZE];
        inst.process_float(1, &[], &mut output).unwrap();
        assert!(output.iter().all(|&s| s == -1.0));

        inst.create_array("render-table", 2).unwrap();
        inst.write_array("render-table", 0, &[0.25]).unwrap();
        inst.process_float(1, &[], &mut output).unwrap();
        assert!(output.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_init_audio_changes_expected_lengths() {
        let inst = new_instance(EngineConfig::default()).unwrap();
        inst.init_audio(1, 1, 48000).unwrap();
        let input = vec![0.0f32; BLOCK_SIZE];
        let mut output = vec![0.0f32; BLOCK_SIZE];
        inst.process_float(1, &input, &mut output).unwrap();
        assert_eq!(inst.config().unwrap().sample_rate, 48000);
        assert!(inst.init_audio(1, 1, 10).is_err());
    }
}
