//! Error types for the block circular buffer.

use thiserror::Error;

/// Errors raised by [`BlockCirclebuf`](crate::BlockCirclebuf) operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Acquiring a superblock allocation failed.
    #[error("out of memory allocating a superblock of {requested} elements")]
    OutOfMemory { requested: usize },

    /// Superblocks must hold at least one element.
    #[error("superblock capacity must be non-zero")]
    InvalidCapacity,

    /// A position lies outside the block it was paired with.
    #[error("index {index} is out of range for block [{start}, {end})")]
    OutOfRange {
        index: usize,
        start: usize,
        end: usize,
    },

    /// A handle passed to split a block refers to a different block.
    #[error("handle used to split a block references a different block")]
    ForeignHandle,

    /// The block id no longer refers to a live block.
    #[error("block id is stale or was never allocated")]
    StaleBlock,

    /// The handle id no longer refers to a live handle.
    #[error("handle id is stale or was never allocated")]
    StaleHandle,

    /// Head and tail are owned by the buffer and cannot be moved or released.
    #[error("head and tail handles are owned by the buffer")]
    ReservedHandle,

    /// No block can supply a contiguous run of the requested length.
    #[error("cannot reserve {requested} contiguous elements, largest block holds {largest}")]
    ReservationTooLarge { requested: usize, largest: usize },

    /// The head may never sit inside protected memory.
    #[error("the write head lies inside the region being protected")]
    HeadInProtectedBlock,

    /// The block is already excluded from the rotation.
    #[error("block is already protected")]
    AlreadyProtected,

    /// The block is not excluded from the rotation.
    #[error("block is not protected")]
    NotProtected,

    /// A protected range must span at least one element.
    #[error("protected range is empty")]
    EmptyRange,
}

impl BufferError {
    /// Whether this error indicates broken bookkeeping in the caller rather
    /// than a request the current buffer geometry cannot satisfy.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. }
                | Self::ForeignHandle
                | Self::StaleBlock
                | Self::StaleHandle
                | Self::ReservedHandle
        )
    }
}

/// Result type alias for buffer operations.
pub type BufferResult<T> = std::result::Result<T, BufferError>;
