//! Replay Encoder - Clip capture
//!
//! Glue between a host media pipeline and the block circular buffer.
//!
//! Architecture:
//! - `ClipBuffer`: timestamped packets framed in a byte `BlockCirclebuf`
//! - `ClipEncoder`: trait for turning frames into buffered clip packets
//! - `RawEncoder`: stores media unmodified, one clip buffer per stream
//! - `ReplayFilter`: passes media through and saves replays on request

pub mod clip_buffer;
pub mod encoder;
pub mod filter;

pub use clip_buffer::{ClipBuffer, Packet, SavedClip, PACKET_HEADER_LEN};
pub use encoder::{ClipEncoder, ClipExport, EncodedClip, RawEncoder};
pub use filter::{ReplayFilter, SavedReplay};
