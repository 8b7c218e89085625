//! Error types for tessera-core.

use thiserror::Error;

/// Error type for tessera-core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid ring buffer capacity: {0}. Must be a non-zero multiple of 256")]
    InvalidCapacity(usize),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Not enough space in ring buffer: requested {requested}, available {available}")]
    InsufficientSpace { requested: usize, available: usize },

    #[error("Not enough data in ring buffer: requested {requested}, available {available}")]
    InsufficientData { requested: usize, available: usize },

    #[error("No receiver bound to '{0}'")]
    UnknownReceiver(String),

    #[error("No class named '{0}'")]
    UnknownClass(String),

    #[error("No array named '{0}'")]
    UnknownArray(String),

    #[error("Array range out of bounds: offset={offset}, len={len}, size={size}")]
    ArrayBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("Audio buffer too small: expected {expected} samples, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Invalid tick count: {0}")]
    InvalidTicks(i64),

    #[error("Instance has been freed")]
    InstanceFreed,

    #[error("Instance is locked by another thread")]
    InstanceBusy,

    #[error("MIDI: {0}")]
    Midi(#[from] tessera_midi::Error),
}

impl Error {
    /// Negative status code for hosts with a C-style boundary.
    ///
    /// `-1` covers argument-range and unknown-receiver errors, `-2` array
    /// bounds and `-3` instance lifecycle misuse.
    pub fn status(&self) -> i32 {
        match self {
            Error::UnknownArray(_) | Error::ArrayBounds { .. } => -2,
            Error::InstanceFreed | Error::InstanceBusy => -3,
            _ => -1,
        }
    }
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_negative() {
        let errors = [
            Error::UnknownReceiver("foo".into()),
            Error::ArrayBounds {
                offset: 4,
                len: 8,
                size: 10,
            },
            Error::InstanceBusy,
            Error::Midi(tessera_midi::Error::ChannelOutOfRange(-1)),
        ];
        assert_eq!(
            errors.iter().map(Error::status).collect::<Vec<_>>(),
            vec![-1, -2, -3, -1]
        );
    }
}
