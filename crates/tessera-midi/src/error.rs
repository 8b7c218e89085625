//! Error types for MIDI argument validation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid MIDI channel: {0}. Must be non-negative")]
    ChannelOutOfRange(i32),

    #[error("Invalid MIDI port: {0}. Must be between 0 and 4095")]
    PortOutOfRange(i32),

    #[error("Invalid {what}: {value}. Must be between {min} and {max}")]
    ValueOutOfRange {
        what: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
