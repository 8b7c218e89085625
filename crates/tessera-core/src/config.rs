//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::ring_buffer::RING_ALIGNMENT;
use crate::{Error, Result};

/// Frames per tick. Processing always advances in whole ticks.
pub const BLOCK_SIZE: usize = 64;

/// Default capacity of each event queue, in bytes.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16384;

/// Longest print line handed to the print hook, including room for a terminator.
pub const PRINT_LINE_SIZE: usize = 2048;

/// Scale between 16-bit samples and floats.
pub const SHORT_SCALE: f32 = 32767.0;

pub const MAX_CHANNELS: usize = 64;

/// Configuration for an engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub input_channels: usize,
    pub output_channels: usize,
    /// Bytes per event queue. Must be a multiple of 256.
    pub queue_capacity: usize,
    /// Upper bound on messages waiting for dispatch, per processing call.
    pub max_pending_messages: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            input_channels: 2,
            output_channels: 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_pending_messages: 1024,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000..=384_000).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.input_channels > MAX_CHANNELS || self.output_channels > MAX_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "channel count {}/{} exceeds {MAX_CHANNELS}",
                self.input_channels, self.output_channels
            )));
        }
        if self.queue_capacity == 0 || self.queue_capacity % RING_ALIGNMENT != 0 {
            return Err(Error::InvalidConfig(format!(
                "queue_capacity {} must be a non-zero multiple of {RING_ALIGNMENT}",
                self.queue_capacity
            )));
        }
        if self.max_pending_messages == 0 {
            return Err(Error::InvalidConfig(
                "max_pending_messages must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
