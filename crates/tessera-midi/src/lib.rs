//! MIDI model for the tessera engine bridge.
//!
//! Hosts inject MIDI into an engine instance and receive MIDI output from it through
//! [`MidiMessage`]. Constructors validate host arguments the same way for every entry
//! point, so an out-of-range value is rejected before any engine lock is taken.
//!
//! # Example
//!
//! ```
//! use tessera_midi::MidiMessage;
//!
//! let msg = MidiMessage::note_on(0x12, 60, 100).unwrap();
//! let channel = msg.port_channel().unwrap();
//! assert_eq!(channel.port(), 1);
//! assert_eq!(channel.channel(), 2);
//!
//! assert!(MidiMessage::note_on(-1, 60, 100).is_err());
//! ```

pub mod error;
pub use error::{Error, Result};

mod message;
pub use message::{MidiMessage, PortChannel, MAX_PORT, PITCH_BEND_CENTER};

// Re-export upstream types used in `MidiMessage::to_midi_msg`
pub use midi_msg::{Channel, ChannelVoiceMsg, MidiMsg};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn port_channel_round_trip(port in 0u16..=MAX_PORT, channel in 0u8..16) {
            let packed = PortChannel::new(port, channel);
            let parsed = PortChannel::from_raw(i32::from(packed)).unwrap();
            prop_assert_eq!(parsed.port(), port);
            prop_assert_eq!(parsed.channel(), channel);
        }

        #[test]
        fn note_on_accepts_exactly_seven_bit(pitch in -300i32..300, velocity in -300i32..300) {
            let ok = (0..=127).contains(&pitch) && (0..=127).contains(&velocity);
            prop_assert_eq!(MidiMessage::note_on(0, pitch, velocity).is_ok(), ok);
        }
    }
}
