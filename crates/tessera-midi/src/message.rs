//! MIDI messages crossing the engine boundary.
//!
//! Input messages are validated before they reach the engine (out-of-range values are
//! rejected). Output messages produced by the engine are clamped into range instead.

use midi_msg::{Channel, ChannelVoiceMsg, MidiMsg};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest MIDI port number addressable through a packed channel.
pub const MAX_PORT: u16 = 0x0fff;

/// Pitch bend values are signed around this centre.
pub const PITCH_BEND_CENTER: i32 = 8192;

/// A MIDI channel packed together with its port: `port << 4 | channel`.
///
/// Channel numbers above 15 address the following ports, so channel 16 is
/// channel 0 on port 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortChannel(u32);

impl PortChannel {
    #[inline]
    pub fn new(port: u16, channel: u8) -> Self {
        Self((u32::from(port.min(MAX_PORT)) << 4) | u32::from(channel & 0x0f))
    }

    /// Validates a raw packed channel as received from a host.
    pub fn from_raw(raw: i32) -> Result<Self> {
        if raw < 0 {
            return Err(Error::ChannelOutOfRange(raw));
        }
        let port = raw >> 4;
        if port > i32::from(MAX_PORT) {
            return Err(Error::PortOutOfRange(port));
        }
        Ok(Self(raw as u32))
    }

    #[inline]
    pub fn port(&self) -> u16 {
        (self.0 >> 4) as u16
    }

    #[inline]
    pub fn channel(&self) -> u8 {
        (self.0 & 0x0f) as u8
    }

    #[inline]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl From<PortChannel> for i32 {
    fn from(pc: PortChannel) -> Self {
        pc.0 as i32
    }
}

/// A MIDI event as seen by the engine, either injected by the host or emitted by a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    NoteOn {
        channel: PortChannel,
        pitch: u8,
        velocity: u8,
    },
    ControlChange {
        channel: PortChannel,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: PortChannel,
        program: u8,
    },
    /// Signed bend in `-8192..=8191`.
    PitchBend {
        channel: PortChannel,
        value: i16,
    },
    AfterTouch {
        channel: PortChannel,
        value: u8,
    },
    PolyAfterTouch {
        channel: PortChannel,
        pitch: u8,
        value: u8,
    },
    Byte {
        port: u16,
        byte: u8,
    },
    SysEx {
        port: u16,
        byte: u8,
    },
    SysRealtime {
        port: u16,
        byte: u8,
    },
}

#[inline]
fn check_range(what: &'static str, value: i32, min: i32, max: i32) -> Result<()> {
    if value < min || value > max {
        return Err(Error::ValueOutOfRange {
            what,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[inline]
fn check_7bit(what: &'static str, value: i32) -> Result<u8> {
    check_range(what, value, 0, 0x7f)?;
    Ok(value as u8)
}

#[inline]
fn check_port(port: i32) -> Result<u16> {
    if port < 0 || port > i32::from(MAX_PORT) {
        return Err(Error::PortOutOfRange(port));
    }
    Ok(port as u16)
}

#[inline]
fn check_byte(byte: i32) -> Result<u8> {
    check_range("byte", byte, 0, 0xff)?;
    Ok(byte as u8)
}

impl MidiMessage {
    pub fn note_on(channel: i32, pitch: i32, velocity: i32) -> Result<Self> {
        Ok(Self::NoteOn {
            channel: PortChannel::from_raw(channel)?,
            pitch: check_7bit("pitch", pitch)?,
            velocity: check_7bit("velocity", velocity)?,
        })
    }

    pub fn control_change(channel: i32, controller: i32, value: i32) -> Result<Self> {
        Ok(Self::ControlChange {
            channel: PortChannel::from_raw(channel)?,
            controller: check_7bit("controller", controller)?,
            value: check_7bit("value", value)?,
        })
    }

    pub fn program_change(channel: i32, program: i32) -> Result<Self> {
        Ok(Self::ProgramChange {
            channel: PortChannel::from_raw(channel)?,
            program: check_7bit("program", program)?,
        })
    }

    pub fn pitch_bend(channel: i32, value: i32) -> Result<Self> {
        let channel = PortChannel::from_raw(channel)?;
        check_range(
            "pitch bend",
            value,
            -PITCH_BEND_CENTER,
            PITCH_BEND_CENTER - 1,
        )?;
        Ok(Self::PitchBend {
            channel,
            value: value as i16,
        })
    }

    pub fn after_touch(channel: i32, value: i32) -> Result<Self> {
        Ok(Self::AfterTouch {
            channel: PortChannel::from_raw(channel)?,
            value: check_7bit("value", value)?,
        })
    }

    pub fn poly_after_touch(channel: i32, pitch: i32, value: i32) -> Result<Self> {
        Ok(Self::PolyAfterTouch {
            channel: PortChannel::from_raw(channel)?,
            pitch: check_7bit("pitch", pitch)?,
            value: check_7bit("value", value)?,
        })
    }

    pub fn byte(port: i32, byte: i32) -> Result<Self> {
        Ok(Self::Byte {
            port: check_port(port)?,
            byte: check_byte(byte)?,
        })
    }

    pub fn sysex(port: i32, byte: i32) -> Result<Self> {
        Ok(Self::SysEx {
            port: check_port(port)?,
            byte: check_byte(byte)?,
        })
    }

    pub fn sys_realtime(port: i32, byte: i32) -> Result<Self> {
        Ok(Self::SysRealtime {
            port: check_port(port)?,
            byte: check_byte(byte)?,
        })
    }

    /// Clamps every field into its legal range. Applied to engine output.
    pub fn clamped(self) -> Self {
        let c7 = |v: u8| v.min(0x7f);
        match self {
            Self::NoteOn {
                channel,
                pitch,
                velocity,
            } => Self::NoteOn {
                channel,
                pitch: c7(pitch),
                velocity: c7(velocity),
            },
            Self::ControlChange {
                channel,
                controller,
                value,
            } => Self::ControlChange {
                channel,
                controller: c7(controller),
                value: c7(value),
            },
            Self::ProgramChange { channel, program } => Self::ProgramChange {
                channel,
                program: c7(program),
            },
            Self::PitchBend { channel, value } => Self::PitchBend {
                channel,
                value: value.clamp(-PITCH_BEND_CENTER as i16, (PITCH_BEND_CENTER - 1) as i16),
            },
            Self::AfterTouch { channel, value } => Self::AfterTouch {
                channel,
                value: c7(value),
            },
            Self::PolyAfterTouch {
                channel,
                pitch,
                value,
            } => Self::PolyAfterTouch {
                channel,
                pitch: c7(pitch),
                value: c7(value),
            },
            Self::Byte { port, byte } => Self::Byte {
                port: port.min(MAX_PORT),
                byte,
            },
            Self::SysEx { port, byte } => Self::SysEx {
                port: port.min(MAX_PORT),
                byte,
            },
            Self::SysRealtime { port, byte } => Self::SysRealtime {
                port: port.min(MAX_PORT),
                byte,
            },
        }
    }

    /// Packed port/channel for channel voice messages.
    #[inline]
    pub fn port_channel(&self) -> Option<PortChannel> {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::PitchBend { channel, .. }
            | Self::AfterTouch { channel, .. }
            | Self::PolyAfterTouch { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Pitch bend shifted to the unsigned 14-bit wire range.
    #[inline]
    pub fn pitch_bend_unsigned(value: i16) -> u16 {
        (i32::from(value) + PITCH_BEND_CENTER) as u16
    }

    /// Channel voice messages as a `midi-msg` value, `None` for raw bytes.
    pub fn to_midi_msg(&self) -> Option<MidiMsg> {
        let (channel, msg) = match *self {
            Self::NoteOn {
                channel,
                pitch,
                velocity,
            } => (
                channel,
                ChannelVoiceMsg::NoteOn {
                    note: pitch,
                    velocity,
                },
            ),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => (
                channel,
                ChannelVoiceMsg::ControlChange {
                    control: midi_msg::ControlChange::CC {
                        control: controller,
                        value,
                    },
                },
            ),
            Self::ProgramChange { channel, program } => {
                (channel, ChannelVoiceMsg::ProgramChange { program })
            }
            Self::PitchBend { channel, value } => (
                channel,
                ChannelVoiceMsg::PitchBend {
                    bend: Self::pitch_bend_unsigned(value),
                },
            ),
            Self::AfterTouch { channel, value } => {
                (channel, ChannelVoiceMsg::ChannelPressure { pressure: value })
            }
            Self::PolyAfterTouch {
                channel,
                pitch,
                value,
            } => (
                channel,
                ChannelVoiceMsg::PolyPressure {
                    note: pitch,
                    pressure: value,
                },
            ),
            Self::Byte { .. } | Self::SysEx { .. } | Self::SysRealtime { .. } => return None,
        };
        Some(MidiMsg::ChannelVoice {
            channel: Channel::from_u8(channel.channel()),
            msg,
        })
    }

    /// Wire bytes for forwarding to hardware. The port is not encoded.
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Self::Byte { byte, .. } | Self::SysEx { byte, .. } | Self::SysRealtime { byte, .. } => {
                vec![byte]
            }
            _ => self
                .to_midi_msg()
                .map(|msg| msg.to_midi())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_channel_packing() {
        let pc = PortChannel::from_raw(0x23).unwrap();
        assert_eq!(pc.port(), 2);
        assert_eq!(pc.channel(), 3);
        assert_eq!(PortChannel::new(2, 3), pc);
        assert_eq!(i32::from(pc), 0x23);
    }

    #[test]
    fn test_negative_channel_rejected() {
        assert_eq!(
            MidiMessage::note_on(-1, 60, 100),
            Err(Error::ChannelOutOfRange(-1))
        );
    }

    #[test]
    fn test_seven_bit_ranges() {
        assert!(MidiMessage::note_on(0, 127, 127).is_ok());
        assert!(MidiMessage::note_on(0, 128, 0).is_err());
        assert!(MidiMessage::control_change(0, 7, -1).is_err());
        assert!(MidiMessage::program_change(0, 200).is_err());
        assert!(MidiMessage::poly_after_touch(0, 60, 128).is_err());
    }

    #[test]
    fn test_pitch_bend_range() {
        assert!(MidiMessage::pitch_bend(0, -8192).is_ok());
        assert!(MidiMessage::pitch_bend(0, 8191).is_ok());
        assert!(MidiMessage::pitch_bend(0, 8192).is_err());
        assert!(MidiMessage::pitch_bend(0, -8193).is_err());
        assert_eq!(MidiMessage::pitch_bend_unsigned(0), 8192);
        assert_eq!(MidiMessage::pitch_bend_unsigned(-8192), 0);
    }

    #[test]
    fn test_port_and_byte_ranges() {
        assert!(MidiMessage::byte(0x0fff, 0xff).is_ok());
        assert_eq!(
            MidiMessage::byte(0x1000, 0),
            Err(Error::PortOutOfRange(0x1000))
        );
        assert!(MidiMessage::sysex(0, 256).is_err());
        assert!(MidiMessage::sys_realtime(-1, 0xf8).is_err());
    }

    #[test]
    fn test_clamped_output() {
        let msg = MidiMessage::NoteOn {
            channel: PortChannel::new(0, 0),
            pitch: 200,
            velocity: 255,
        };
        assert_eq!(
            msg.clamped(),
            MidiMessage::NoteOn {
                channel: PortChannel::new(0, 0),
                pitch: 127,
                velocity: 127,
            }
        );
    }

    #[test]
    fn test_to_bytes() {
        let note = MidiMessage::note_on(1, 60, 100).unwrap();
        assert_eq!(note.to_bytes(), vec![0x91, 60, 100]);

        let bend = MidiMessage::pitch_bend(0, 0).unwrap();
        assert_eq!(bend.to_bytes(), vec![0xe0, 0x00, 0x40]);

        let raw = MidiMessage::byte(0, 0xf8).unwrap();
        assert_eq!(raw.to_bytes(), vec![0xf8]);
    }
}
