//! Replay Core - Shared types
//!
//! Error type, raw media types and configuration used by every crate above
//! the block circular buffer.

pub mod config;
pub mod error;
pub mod frame;

pub use config::ReplayConfig;
pub use error::{ReplayError, Result};
pub use frame::{AudioPacket, VideoFrame, NANOS_PER_SECOND};
