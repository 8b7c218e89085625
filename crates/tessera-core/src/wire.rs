//! Binary layout of records in the event ring buffers.
//!
//! Every record is a fixed-size header followed by `payload_len` bytes, so a reader
//! can walk a drained batch without any metadata beyond the records themselves.
//!
//! Control record: [`ControlHeader`] (24 bytes) + payload. Print payload is UTF-8 text
//! padded with zeros to [`WORD_ALIGN`], with the unpadded length in `count`. List and
//! typed-message payload is `count` atoms of [`ATOM_STRIDE`] bytes each.
//!
//! MIDI record: [`MidiHeader`] (16 bytes), no payload.

use bytemuck::{Pod, Zeroable};
use tessera_midi::{MidiMessage, PortChannel};

use crate::atom::{Atom, Symbol};

/// Text payloads are padded to this so following headers stay word-aligned.
pub const WORD_ALIGN: usize = 8;

pub const CONTROL_HEADER_SIZE: usize = core::mem::size_of::<ControlHeader>();
pub const MIDI_HEADER_SIZE: usize = core::mem::size_of::<MidiHeader>();
pub const ATOM_STRIDE: usize = core::mem::size_of::<WireAtom>();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlKind {
    Print = 1,
    Bang = 2,
    Float = 3,
    Symbol = 4,
    List = 5,
    Message = 6,
}

impl ControlKind {
    fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Print,
            2 => Self::Bang,
            3 => Self::Float,
            4 => Self::Symbol,
            5 => Self::List,
            6 => Self::Message,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MidiKind {
    NoteOn = 1,
    ControlChange = 2,
    ProgramChange = 3,
    PitchBend = 4,
    AfterTouch = 5,
    PolyAfterTouch = 6,
    Byte = 7,
}

impl MidiKind {
    fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::NoteOn,
            2 => Self::ControlChange,
            3 => Self::ProgramChange,
            4 => Self::PitchBend,
            5 => Self::AfterTouch,
            6 => Self::PolyAfterTouch,
            7 => Self::Byte,
            _ => return None,
        })
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ControlHeader {
    pub kind: u8,
    _pad: [u8; 3],
    /// Symbol id of the receiver name the event came from.
    pub source: u32,
    pub value: f32,
    /// Symbol id of the symbol value or message selector.
    pub symbol: u32,
    /// Atom count, or unpadded text length for print records.
    pub count: u32,
    /// Bytes following this header.
    pub payload_len: u32,
}

impl ControlHeader {
    pub fn new(kind: ControlKind, source: Symbol) -> Self {
        Self {
            kind: kind as u8,
            source: source.id(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn record_len(&self) -> usize {
        CONTROL_HEADER_SIZE + self.payload_len as usize
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MidiHeader {
    pub kind: u8,
    _pad: [u8; 3],
    pub a: i32,
    pub b: i32,
    pub c: i32,
}

impl MidiHeader {
    pub fn new(kind: MidiKind, a: i32, b: i32, c: i32) -> Self {
        Self {
            kind: kind as u8,
            _pad: [0; 3],
            a,
            b,
            c,
        }
    }

    /// Encodes an (already clamped) MIDI message. Channel messages carry the packed
    /// port/channel in `a`; byte messages carry the port.
    pub fn from_message(msg: &MidiMessage) -> Self {
        match *msg {
            MidiMessage::NoteOn {
                channel,
                pitch,
                velocity,
            } => Self::new(
                MidiKind::NoteOn,
                channel.into(),
                pitch.into(),
                velocity.into(),
            ),
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => Self::new(
                MidiKind::ControlChange,
                channel.into(),
                controller.into(),
                value.into(),
            ),
            MidiMessage::ProgramChange { channel, program } => {
                Self::new(MidiKind::ProgramChange, channel.into(), program.into(), 0)
            }
            MidiMessage::PitchBend { channel, value } => {
                Self::new(MidiKind::PitchBend, channel.into(), value.into(), 0)
            }
            MidiMessage::AfterTouch { channel, value } => {
                Self::new(MidiKind::AfterTouch, channel.into(), value.into(), 0)
            }
            MidiMessage::PolyAfterTouch {
                channel,
                pitch,
                value,
            } => Self::new(
                MidiKind::PolyAfterTouch,
                channel.into(),
                pitch.into(),
                value.into(),
            ),
            MidiMessage::Byte { port, byte }
            | MidiMessage::SysEx { port, byte }
            | MidiMessage::SysRealtime { port, byte } => {
                Self::new(MidiKind::Byte, port.into(), byte.into(), 0)
            }
        }
    }

    pub fn to_message(&self) -> Option<MidiMessage> {
        let channel = || PortChannel::from_raw(self.a).ok();
        let u7 = |v: i32| v.clamp(0, 0x7f) as u8;
        Some(match MidiKind::from_u8(self.kind)? {
            MidiKind::NoteOn => MidiMessage::NoteOn {
                channel: channel()?,
                pitch: u7(self.b),
                velocity: u7(self.c),
            },
            MidiKind::ControlChange => MidiMessage::ControlChange {
                channel: channel()?,
                controller: u7(self.b),
                value: u7(self.c),
            },
            MidiKind::ProgramChange => MidiMessage::ProgramChange {
                channel: channel()?,
                program: u7(self.b),
            },
            MidiKind::PitchBend => MidiMessage::PitchBend {
                channel: channel()?,
                value: self.b as i16,
            },
            MidiKind::AfterTouch => MidiMessage::AfterTouch {
                channel: channel()?,
                value: u7(self.b),
            },
            MidiKind::PolyAfterTouch => MidiMessage::PolyAfterTouch {
                channel: channel()?,
                pitch: u7(self.b),
                value: u7(self.c),
            },
            MidiKind::Byte => MidiMessage::Byte {
                port: self.a.clamp(0, i32::from(tessera_midi::MAX_PORT)) as u16,
                byte: self.b.clamp(0, 0xff) as u8,
            },
        })
    }
}

const TAG_FLOAT: u32 = 0;
const TAG_SYMBOL: u32 = 1;
const TAG_POINTER: u32 = 2;

/// Fixed-stride atom as stored in a payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireAtom {
    tag: u32,
    bits: u32,
}

impl From<&Atom> for WireAtom {
    fn from(atom: &Atom) -> Self {
        match *atom {
            Atom::Float(f) => Self {
                tag: TAG_FLOAT,
                bits: f.to_bits(),
            },
            Atom::Symbol(s) => Self {
                tag: TAG_SYMBOL,
                bits: s.id(),
            },
            Atom::Pointer => Self {
                tag: TAG_POINTER,
                bits: 0,
            },
        }
    }
}

impl WireAtom {
    pub fn to_atom(self) -> Atom {
        match self.tag {
            TAG_FLOAT => Atom::Float(f32::from_bits(self.bits)),
            TAG_SYMBOL => Atom::Symbol(Symbol::from_id(self.bits).unwrap_or(Symbol::empty())),
            _ => Atom::Pointer,
        }
    }
}

/// Bytes needed to carry `text_len` bytes of text, including padding.
#[inline]
pub fn padded_len(text_len: usize) -> usize {
    text_len.div_ceil(WORD_ALIGN) * WORD_ALIGN
}

/// Zero-copy view of an atom payload inside a drained batch.
///
/// Borrowed from the drain scratch buffer, so it only lives as long as the hook call.
#[derive(Clone, Copy)]
pub struct AtomSlice<'a> {
    bytes: &'a [u8],
}

impl<'a> AtomSlice<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len() % ATOM_STRIDE, 0);
        Self { bytes }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len() / ATOM_STRIDE
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Atom> {
        let start = index.checked_mul(ATOM_STRIDE)?;
        let chunk = self.bytes.get(start..start + ATOM_STRIDE)?;
        Some(bytemuck::pod_read_unaligned::<WireAtom>(chunk).to_atom())
    }

    pub fn iter(&self) -> impl Iterator<Item = Atom> + 'a {
        self.bytes
            .chunks_exact(ATOM_STRIDE)
            .map(|chunk| bytemuck::pod_read_unaligned::<WireAtom>(chunk).to_atom())
    }

    /// Copies the atoms out of the batch.
    pub fn to_vec(&self) -> Vec<Atom> {
        self.iter().collect()
    }
}

impl core::fmt::Debug for AtomSlice<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// A control record decoded from a drained batch.
#[derive(Debug)]
pub enum ControlEvent<'a> {
    Print(&'a str),
    Bang {
        source: Symbol,
    },
    Float {
        source: Symbol,
        value: f32,
    },
    Symbol {
        source: Symbol,
        symbol: Symbol,
    },
    List {
        source: Symbol,
        atoms: AtomSlice<'a>,
    },
    Message {
        source: Symbol,
        selector: Symbol,
        atoms: AtomSlice<'a>,
    },
}

/// Why a batch walk stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    UnknownKind(u8),
    Malformed,
}

/// Decodes the control record at the start of `bytes`. Returns the event and the
/// record length to advance by.
pub fn decode_control(bytes: &[u8]) -> Result<(ControlEvent<'_>, usize), DecodeError> {
    let head = bytes
        .get(..CONTROL_HEADER_SIZE)
        .ok_or(DecodeError::Truncated)?;
    let header: ControlHeader = bytemuck::pod_read_unaligned(head);
    let len = header.record_len();
    let payload = bytes
        .get(CONTROL_HEADER_SIZE..len)
        .ok_or(DecodeError::Truncated)?;
    let kind = ControlKind::from_u8(header.kind).ok_or(DecodeError::UnknownKind(header.kind))?;
    let symbol = |id: u32| Symbol::from_id(id).ok_or(DecodeError::Malformed);
    let atoms = || {
        let n = (header.count as usize)
            .checked_mul(ATOM_STRIDE)
            .ok_or(DecodeError::Malformed)?;
        payload
            .get(..n)
            .map(AtomSlice::new)
            .ok_or(DecodeError::Malformed)
    };

    let event = match kind {
        ControlKind::Print => {
            let text = payload
                .get(..header.count as usize)
                .ok_or(DecodeError::Malformed)?;
            ControlEvent::Print(core::str::from_utf8(text).map_err(|_| DecodeError::Malformed)?)
        }
        ControlKind::Bang => ControlEvent::Bang {
            source: symbol(header.source)?,
        },
        ControlKind::Float => ControlEvent::Float {
            source: symbol(header.source)?,
            value: header.value,
        },
        ControlKind::Symbol => ControlEvent::Symbol {
            source: symbol(header.source)?,
            symbol: symbol(header.symbol)?,
        },
        ControlKind::List => ControlEvent::List {
            source: symbol(header.source)?,
            atoms: atoms()?,
        },
        ControlKind::Message => ControlEvent::Message {
            source: symbol(header.source)?,
            selector: symbol(header.symbol)?,
            atoms: atoms()?,
        },
    };
    Ok((event, len))
}

/// Decodes the MIDI record at the start of `bytes`.
pub fn decode_midi(bytes: &[u8]) -> Result<(MidiMessage, usize), DecodeError> {
    let head = bytes.get(..MIDI_HEADER_SIZE).ok_or(DecodeError::Truncated)?;
    let header: MidiHeader = bytemuck::pod_read_unaligned(head);
    if MidiKind::from_u8(header.kind).is_none() {
        return Err(DecodeError::UnknownKind(header.kind));
    }
    let msg = header.to_message().ok_or(DecodeError::Malformed)?;
    Ok((msg, MIDI_HEADER_SIZE))
}
