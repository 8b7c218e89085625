//! Event queues between the audio thread and the host's consumer thread.
//!
//! Producers run inside engine processing: they size the record, check it against
//! the free space and either write it in one go or drop it. They never block, never
//! allocate and never log. Consumers drain everything available into a scratch
//! buffer and dispatch each record to the matching hook.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tessera_midi::{MidiMessage, PortChannel, MAX_PORT, PITCH_BEND_CENTER};
use tracing::{trace, warn};

use crate::atom::{Atom, Message, Symbol};
use crate::hooks::HookTable;
use crate::ring_buffer::{Consumer, Producer, RingBuffer};
use crate::wire::{
    decode_control, decode_midi, padded_len, ControlEvent, ControlHeader, ControlKind,
    MidiHeader, WireAtom, ATOM_STRIDE, CONTROL_HEADER_SIZE, WORD_ALIGN,
};
use crate::Result;

const ZEROS: [u8; WORD_ALIGN] = [0; WORD_ALIGN];

/// Dropped-record counter shared by both halves of a queue.
#[derive(Debug, Default)]
pub(crate) struct DropCounter {
    dropped: AtomicUsize,
}

impl DropCounter {
    #[inline]
    fn record(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn get(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Producer side of the control queue.
pub struct ControlEventProducer {
    ring: Producer,
    atoms: Vec<WireAtom>,
    drops: Arc<DropCounter>,
}

impl ControlEventProducer {
    fn write_record(&mut self, header: ControlHeader, payload: &[&[u8]]) -> bool {
        let len = header.record_len();
        if len > self.ring.available_to_write() {
            self.drops.record();
            return false;
        }
        let header = bytemuck::bytes_of(&header);
        let written = match payload {
            [] => self.ring.write(&[header]),
            [a] => self.ring.write(&[header, *a]),
            [a, b] => self.ring.write(&[header, *a, *b]),
            _ => unreachable!("control records have at most two payload chunks"),
        };
        debug_assert!(written.is_ok());
        written.is_ok()
    }

    /// Queues a print record. The text is padded to [`WORD_ALIGN`].
    pub fn print(&mut self, text: &str) -> bool {
        let padded = padded_len(text.len());
        let mut header = ControlHeader::new(ControlKind::Print, Symbol::empty());
        header.count = text.len() as u32;
        header.payload_len = padded as u32;
        self.write_record(header, &[text.as_bytes(), &ZEROS[..padded - text.len()]])
    }

    pub fn bang(&mut self, source: Symbol) -> bool {
        self.write_record(ControlHeader::new(ControlKind::Bang, source), &[])
    }

    pub fn float(&mut self, source: Symbol, value: f32) -> bool {
        let mut header = ControlHeader::new(ControlKind::Float, source);
        header.value = value;
        self.write_record(header, &[])
    }

    pub fn symbol(&mut self, source: Symbol, symbol: Symbol) -> bool {
        let mut header = ControlHeader::new(ControlKind::Symbol, source);
        header.symbol = symbol.id();
        self.write_record(header, &[])
    }

    pub fn list(&mut self, source: Symbol, atoms: &[Atom]) -> bool {
        self.atom_record(ControlHeader::new(ControlKind::List, source), atoms)
    }

    pub fn message(&mut self, source: Symbol, selector: Symbol, atoms: &[Atom]) -> bool {
        let mut header = ControlHeader::new(ControlKind::Message, source);
        header.symbol = selector.id();
        self.atom_record(header, atoms)
    }

    /// Queues `message` as the record kind matching its shape.
    ///
    /// Pointer messages have nothing to carry and are ignored.
    pub fn push(&mut self, source: Symbol, message: &Message) -> bool {
        match message {
            Message::Bang => self.bang(source),
            Message::Float(f) => self.float(source, *f),
            Message::Symbol(s) => self.symbol(source, *s),
            Message::Pointer => true,
            Message::List(atoms) => self.list(source, atoms),
            Message::Typed { selector, args } => self.message(source, *selector, args),
        }
    }

    fn atom_record(&mut self, mut header: ControlHeader, atoms: &[Atom]) -> bool {
        let payload = atoms.len().saturating_mul(ATOM_STRIDE);
        if CONTROL_HEADER_SIZE + payload > self.ring.available_to_write() {
            self.drops.record();
            return false;
        }
        header.count = atoms.len() as u32;
        header.payload_len = payload as u32;

        // Capacity was reserved up front and the record fits the ring, so no reallocation.
        self.atoms.clear();
        self.atoms.extend(atoms.iter().map(WireAtom::from));
        let atoms = std::mem::take(&mut self.atoms);
        let queued = self.write_record(header, &[bytemuck::cast_slice(&atoms)]);
        self.atoms = atoms;
        queued
    }

    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.ring.available_to_write()
    }

    #[inline]
    pub fn dropped_events(&self) -> usize {
        self.drops.get()
    }

    /// Discards everything queued. Needs the consumer so nothing is mid-read.
    pub fn clear(&mut self, consumer: &mut ControlEventConsumer) {
        self.ring.clear(&mut consumer.ring);
    }
}

/// Consumer side of the control queue.
pub struct ControlEventConsumer {
    ring: Consumer,
    scratch: Box<[u8]>,
    drops: Arc<DropCounter>,
    reported_drops: usize,
}

impl ControlEventConsumer {
    /// Dispatches every queued control record to `hooks`. Returns the number of
    /// records walked, including those with no hook installed.
    pub fn drain(&mut self, hooks: &mut HookTable) -> usize {
        report_drops("control", &self.drops, &mut self.reported_drops);

        let available = self.ring.available_to_read();
        if available == 0 {
            return 0;
        }
        let batch = &mut self.scratch[..available];
        if self.ring.read(batch).is_err() {
            return 0;
        }

        let mut cursor = 0;
        let mut walked = 0;
        while cursor < available {
            match decode_control(&self.scratch[cursor..available]) {
                Ok((event, len)) => {
                    dispatch_control(hooks, event);
                    cursor += len;
                    walked += 1;
                }
                Err(err) => {
                    warn!(?err, skipped = available - cursor, "control batch stopped early");
                    break;
                }
            }
        }
        trace!(walked, bytes = available, "control queue drained");
        walked
    }

    #[inline]
    pub fn available_to_read(&self) -> usize {
        self.ring.available_to_read()
    }

    #[inline]
    pub fn dropped_events(&self) -> usize {
        self.drops.get()
    }

    /// The counter shared with the producer.
    pub(crate) fn drop_counter(&self) -> Arc<DropCounter> {
        self.drops.clone()
    }
}

fn dispatch_control(hooks: &mut HookTable, event: ControlEvent<'_>) {
    match event {
        ControlEvent::Print(text) => {
            if let Some(hook) = hooks.print.as_mut() {
                hook(text);
            }
        }
        ControlEvent::Bang { source } => {
            if let Some(hook) = hooks.bang.as_mut() {
                hook(source.as_str());
            }
        }
        ControlEvent::Float { source, value } => {
            if let Some(hook) = hooks.float.as_mut() {
                hook(source.as_str(), value);
            }
        }
        ControlEvent::Symbol { source, symbol } => {
            if let Some(hook) = hooks.symbol.as_mut() {
                hook(source.as_str(), symbol.as_str());
            }
        }
        ControlEvent::List { source, atoms } => {
            if let Some(hook) = hooks.list.as_mut() {
                hook(source.as_str(), atoms);
            }
        }
        ControlEvent::Message {
            source,
            selector,
            atoms,
        } => {
            if let Some(hook) = hooks.message.as_mut() {
                hook(source.as_str(), selector.as_str(), atoms);
            }
        }
    }
}

/// Producer side of the MIDI queue.
///
/// The named methods take raw engine values and clamp them into range.
pub struct MidiEventProducer {
    ring: Producer,
    drops: Arc<DropCounter>,
}

#[inline]
fn clamp_channel(channel: i32) -> PortChannel {
    let max = (i32::from(MAX_PORT) << 4) | 0x0f;
    let raw = channel.clamp(0, max);
    PortChannel::new((raw >> 4) as u16, (raw & 0x0f) as u8)
}

#[inline]
fn clamp7(value: i32) -> u8 {
    value.clamp(0, 0x7f) as u8
}

impl MidiEventProducer {
    /// Queues an already-built message, clamped first.
    pub fn push(&mut self, message: &MidiMessage) -> bool {
        let header = MidiHeader::from_message(&message.clamped());
        let record = bytemuck::bytes_of(&header);
        if record.len() > self.ring.available_to_write() {
            self.drops.record();
            return false;
        }
        self.ring.write(&[record]).is_ok()
    }

    pub fn note_on(&mut self, channel: i32, pitch: i32, velocity: i32) -> bool {
        self.push(&MidiMessage::NoteOn {
            channel: clamp_channel(channel),
            pitch: clamp7(pitch),
            velocity: clamp7(velocity),
        })
    }

    pub fn control_change(&mut self, channel: i32, controller: i32, value: i32) -> bool {
        self.push(&MidiMessage::ControlChange {
            channel: clamp_channel(channel),
            controller: clamp7(controller),
            value: clamp7(value),
        })
    }

    pub fn program_change(&mut self, channel: i32, program: i32) -> bool {
        self.push(&MidiMessage::ProgramChange {
            channel: clamp_channel(channel),
            program: clamp7(program),
        })
    }

    /// `value` is the unsigned 14-bit engine value. It is queued centred on zero.
    pub fn pitch_bend(&mut self, channel: i32, value: i32) -> bool {
        let centred = value.clamp(0, 0x3fff) - PITCH_BEND_CENTER;
        self.push(&MidiMessage::PitchBend {
            channel: clamp_channel(channel),
            value: centred as i16,
        })
    }

    pub fn after_touch(&mut self, channel: i32, value: i32) -> bool {
        self.push(&MidiMessage::AfterTouch {
            channel: clamp_channel(channel),
            value: clamp7(value),
        })
    }

    pub fn poly_after_touch(&mut self, channel: i32, pitch: i32, value: i32) -> bool {
        self.push(&MidiMessage::PolyAfterTouch {
            channel: clamp_channel(channel),
            pitch: clamp7(pitch),
            value: clamp7(value),
        })
    }

    pub fn midi_byte(&mut self, port: i32, byte: i32) -> bool {
        self.push(&MidiMessage::Byte {
            port: port.clamp(0, i32::from(MAX_PORT)) as u16,
            byte: byte.clamp(0, 0xff) as u8,
        })
    }

    #[inline]
    pub fn available_to_write(&self) -> usize {
        self.ring.available_to_write()
    }

    #[inline]
    pub fn dropped_events(&self) -> usize {
        self.drops.get()
    }

    pub fn clear(&mut self, consumer: &mut MidiEventConsumer) {
        self.ring.clear(&mut consumer.ring);
    }
}

/// Consumer side of the MIDI queue.
pub struct MidiEventConsumer {
    ring: Consumer,
    scratch: Box<[u8]>,
    drops: Arc<DropCounter>,
    reported_drops: usize,
}

impl MidiEventConsumer {
    pub fn drain(&mut self, hooks: &mut HookTable) -> usize {
        report_drops("midi", &self.drops, &mut self.reported_drops);

        let available = self.ring.available_to_read();
        if available == 0 {
            return 0;
        }
        if self.ring.read(&mut self.scratch[..available]).is_err() {
            return 0;
        }

        let mut cursor = 0;
        let mut walked = 0;
        while cursor < available {
            match decode_midi(&self.scratch[cursor..available]) {
                Ok((message, len)) => {
                    dispatch_midi(hooks, message);
                    cursor += len;
                    walked += 1;
                }
                Err(err) => {
                    warn!(?err, skipped = available - cursor, "midi batch stopped early");
                    break;
                }
            }
        }
        trace!(walked, bytes = available, "midi queue drained");
        walked
    }

    #[inline]
    pub fn available_to_read(&self) -> usize {
        self.ring.available_to_read()
    }

    #[inline]
    pub fn dropped_events(&self) -> usize {
        self.drops.get()
    }

    /// The counter shared with the producer.
    pub(crate) fn drop_counter(&self) -> Arc<DropCounter> {
        self.drops.clone()
    }
}

fn dispatch_midi(hooks: &mut HookTable, message: MidiMessage) {
    match message {
        MidiMessage::NoteOn {
            channel,
            pitch,
            velocity,
        } => {
            if let Some(hook) = hooks.note_on.as_mut() {
                hook(channel.into(), pitch.into(), velocity.into());
            }
        }
        MidiMessage::ControlChange {
            channel,
            controller,
            value,
        } => {
            if let Some(hook) = hooks.control_change.as_mut() {
                hook(channel.into(), controller.into(), value.into());
            }
        }
        MidiMessage::ProgramChange { channel, program } => {
            if let Some(hook) = hooks.program_change.as_mut() {
                hook(channel.into(), program.into());
            }
        }
        MidiMessage::PitchBend { channel, value } => {
            if let Some(hook) = hooks.pitch_bend.as_mut() {
                hook(channel.into(), value.into());
            }
        }
        MidiMessage::AfterTouch { channel, value } => {
            if let Some(hook) = hooks.after_touch.as_mut() {
                hook(channel.into(), value.into());
            }
        }
        MidiMessage::PolyAfterTouch {
            channel,
            pitch,
            value,
        } => {
            if let Some(hook) = hooks.poly_after_touch.as_mut() {
                hook(channel.into(), pitch.into(), value.into());
            }
        }
        MidiMessage::Byte { port, byte }
        | MidiMessage::SysEx { port, byte }
        | MidiMessage::SysRealtime { port, byte } => {
            if let Some(hook) = hooks.midi_byte.as_mut() {
                hook(port.into(), byte.into());
            }
        }
    }
}

fn report_drops(queue: &'static str, drops: &DropCounter, reported: &mut usize) {
    let total = drops.get();
    if total > *reported {
        warn!(queue, dropped = total - *reported, total, "event queue overflowed");
        *reported = total;
    }
}

/// Both event queues of one instance.
pub struct EventQueues {
    pub control_producer: ControlEventProducer,
    pub control_consumer: ControlEventConsumer,
    pub midi_producer: MidiEventProducer,
    pub midi_consumer: MidiEventConsumer,
}

pub fn control_queue(capacity: usize) -> Result<(ControlEventProducer, ControlEventConsumer)> {
    let (producer, consumer) = RingBuffer::new(capacity)?.split();
    let drops = Arc::new(DropCounter::default());
    Ok((
        ControlEventProducer {
            ring: producer,
            atoms: Vec::with_capacity(capacity / ATOM_STRIDE),
            drops: drops.clone(),
        },
        ControlEventConsumer {
            ring: consumer,
            scratch: vec![0u8; capacity].into_boxed_slice(),
            drops,
            reported_drops: 0,
        },
    ))
}

pub fn midi_queue(capacity: usize) -> Result<(MidiEventProducer, MidiEventConsumer)> {
    let (producer, consumer) = RingBuffer::new(capacity)?.split();
    let drops = Arc::new(DropCounter::default());
    Ok((
        MidiEventProducer {
            ring: producer,
            drops: drops.clone(),
        },
        MidiEventConsumer {
            ring: consumer,
            scratch: vec![0u8; capacity].into_boxed_slice(),
            drops,
            reported_drops: 0,
        },
    ))
}

/// Builds a control queue and a MIDI queue of `capacity` bytes each.
pub fn event_queues(capacity: usize) -> Result<EventQueues> {
    let (control_producer, control_consumer) = control_queue(capacity)?;
    let (midi_producer, midi_consumer) = midi_queue(capacity)?;
    Ok(EventQueues {
        control_producer,
        control_consumer,
        midi_producer,
        midi_consumer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn logging_hooks() -> (HookTable, Log) {
        let log: Log = Arc::default();
        let mut hooks = HookTable::new();
        let l = log.clone();
        hooks.set_print_hook(move |s| l.lock().unwrap().push(format!("print:{s}")));
        let l = log.clone();
        hooks.set_bang_hook(move |src| l.lock().unwrap().push(format!("bang:{src}")));
        let l = log.clone();
        hooks.set_float_hook(move |src, v| l.lock().unwrap().push(format!("float:{src}:{v}")));
        let l = log.clone();
        hooks.set_symbol_hook(move |src, s| l.lock().unwrap().push(format!("symbol:{src}:{s}")));
        let l = log.clone();
        hooks.set_list_hook(move |src, atoms| {
            l.lock().unwrap().push(format!("list:{src}:{}", atoms.len()))
        });
        let l = log.clone();
        hooks.set_message_hook(move |src, sel, atoms| {
            l.lock()
                .unwrap()
                .push(format!("message:{src}:{sel}:{:?}", atoms.get(0)))
        });
        let l = log.clone();
        hooks.set_note_on_hook(move |c, p, v| l.lock().unwrap().push(format!("noteon:{c}:{p}:{v}")));
        let l = log.clone();
        hooks.set_pitch_bend_hook(move |c, v| l.lock().unwrap().push(format!("bend:{c}:{v}")));
        let l = log.clone();
        hooks.set_midi_byte_hook(move |p, b| l.lock().unwrap().push(format!("byte:{p}:{b}")));
        (hooks, log)
    }

    #[test]
    fn test_control_events_arrive_in_order() {
        let (mut producer, mut consumer) = control_queue(1024).unwrap();
        let (mut hooks, log) = logging_hooks();

        assert!(producer.float(Symbol::new("foo"), 1.0));
        assert!(producer.bang(Symbol::new("bar")));
        assert!(producer.symbol(Symbol::new("baz"), Symbol::new("hi")));
        assert!(producer.print("hello"));
        assert!(producer.list(Symbol::new("l"), &[Atom::Float(1.0), Atom::from("a")]));
        assert!(producer.message(Symbol::new("m"), Symbol::new("set"), &[Atom::Float(4.0)]));

        assert_eq!(consumer.drain(&mut hooks), 6);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "float:foo:1",
                "bang:bar",
                "symbol:baz:hi",
                "print:hello",
                "list:l:2",
                "message:m:set:Some(Float(4.0))",
            ]
        );
        assert_eq!(consumer.available_to_read(), 0);
    }

    #[test]
    fn test_missing_hook_still_advances() {
        let (mut producer, mut consumer) = control_queue(1024).unwrap();
        let mut hooks = HookTable::new();
        let floats = Arc::new(Mutex::new(Vec::new()));
        let f = floats.clone();
        hooks.set_float_hook(move |_, v| f.lock().unwrap().push(v));

        producer.bang(Symbol::new("a"));
        producer.float(Symbol::new("b"), 2.0);
        producer.list(Symbol::new("c"), &[Atom::Float(0.0)]);
        producer.float(Symbol::new("d"), 3.0);

        assert_eq!(consumer.drain(&mut hooks), 4);
        assert_eq!(*floats.lock().unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_print_is_padded_to_word() {
        let (mut producer, consumer) = control_queue(256).unwrap();
        producer.print("abc");
        assert_eq!(
            consumer.available_to_read(),
            CONTROL_HEADER_SIZE + WORD_ALIGN
        );
    }

    #[test]
    fn test_overflow_drops_whole_records() {
        let (mut producer, mut consumer) = control_queue(256).unwrap();
        let mut queued = 0;
        for i in 0..20 {
            if producer.float(Symbol::new("x"), i as f32) {
                queued += 1;
            }
        }
        // 255 usable bytes hold ten 24-byte records.
        assert_eq!(queued, 10);
        assert_eq!(producer.dropped_events(), 10);

        let mut hooks = HookTable::new();
        assert_eq!(consumer.drain(&mut hooks), 10);
        assert!(producer.float(Symbol::new("x"), 0.0));
    }

    #[test]
    fn test_oversized_list_is_dropped() {
        let (mut producer, consumer) = control_queue(256).unwrap();
        let atoms = vec![Atom::Float(1.0); 64];
        assert!(!producer.list(Symbol::new("big"), &atoms));
        assert_eq!(consumer.dropped_events(), 1);
        assert_eq!(consumer.available_to_read(), 0);
    }

    #[test]
    fn test_pointer_message_is_ignored() {
        let (mut producer, consumer) = control_queue(256).unwrap();
        assert!(producer.push(Symbol::new("p"), &Message::Pointer));
        assert_eq!(consumer.available_to_read(), 0);
    }

    #[test]
    fn test_midi_output_is_clamped() {
        let (mut producer, mut consumer) = midi_queue(256).unwrap();
        let (mut hooks, log) = logging_hooks();

        producer.note_on(0x21, 200, -5);
        producer.pitch_bend(0, 0);
        producer.pitch_bend(0, 20000);
        producer.midi_byte(5000, 0x1f8);

        assert_eq!(consumer.drain(&mut hooks), 4);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "noteon:33:127:0",
                "bend:0:-8192",
                "bend:0:8191",
                "byte:4095:255",
            ]
        );
    }

    #[test]
    fn test_clear_discards_pending() {
        let mut queues = event_queues(512).unwrap();
        queues.control_producer.bang(Symbol::new("x"));
        queues.midi_producer.note_on(0, 60, 1);
        queues.control_producer.clear(&mut queues.control_consumer);
        queues.midi_producer.clear(&mut queues.midi_consumer);
        assert_eq!(queues.control_consumer.available_to_read(), 0);
        assert_eq!(queues.midi_consumer.available_to_read(), 0);
    }
}
