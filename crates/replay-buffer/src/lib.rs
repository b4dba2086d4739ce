//! Replay Buffer - Block circular buffer
//!
//! A circular buffer built from blocks that can be split, frozen out of the
//! write rotation and merged back, with position handles that stay valid
//! through all of it.
//!
//! Architecture:
//! - `SuperblockAllocation`: owned contiguous storage that blocks are views into
//! - `Block`: a `[start, end)` view, linked into a physical and a logical ring
//! - Handles: tracked positions, relinked on split and merge
//! - `BlockCirclebuf`: head/tail cursors, streaming writes and reads
//! - `ProtectedRange`: a frozen span of the stream for clip export

mod arena;
pub mod block;
pub mod buffer;
mod chain;
pub mod error;
pub mod handle;
pub mod range;
pub mod stats;
mod stream;
pub mod superblock;
mod traversal;

pub use block::{BlockId, BlockInfo, ProtectionTag, Protections};
pub use buffer::BlockCirclebuf;
pub use error::{BufferError, BufferResult};
pub use handle::{HandleId, Position};
pub use range::ProtectedRange;
pub use stats::BufferStats;
pub use superblock::SuperblockId;
