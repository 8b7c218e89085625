//! Centralized error type for the tessera umbrella crate.
//!
//! Wraps the subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] tessera_core::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] tessera_midi::Error),

    #[error("No current instance: call tessera::init() or set_current_instance() first")]
    NoInstance,
}

impl Error {
    /// Negative status code for hosts with a C-style boundary.
    pub fn status(&self) -> i32 {
        match self {
            Error::Core(err) => err.status(),
            Error::Midi(_) => -1,
            Error::NoInstance => -3,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
