//! Raw media handed over by the host pipeline.
//!
//! Timestamps are host clock nanoseconds. Payloads are opaque bytes; nothing
//! here knows about pixel formats or sample layouts.

use serde::{Deserialize, Serialize};

/// One uncompressed video frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFrame {
    pub timestamp_ns: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(timestamp_ns: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            timestamp_ns,
            width,
            height,
            data,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// One block of uncompressed audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioPacket {
    pub timestamp_ns: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Vec<u8>,
}

impl AudioPacket {
    pub fn new(timestamp_ns: u64, sample_rate: u32, channels: u16, data: Vec<u8>) -> Self {
        Self {
            timestamp_ns,
            sample_rate,
            channels,
            data,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Nanoseconds per second, for duration arithmetic on timestamps.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;
