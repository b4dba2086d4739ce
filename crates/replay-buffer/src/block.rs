//! Blocks: contiguous views into one superblock, linked into the chain.

use serde::Serialize;
use smallvec::SmallVec;

use crate::arena::Key;
use crate::handle::HandleId;
use crate::superblock::SuperblockId;

/// Stable id of a block in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) Key);

/// Tag shared by every block frozen by the same protection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProtectionTag(pub(crate) u64);

/// Tags freezing one block, sorted. Overlapping ranges stack here.
pub type Protections = SmallVec<[ProtectionTag; 2]>;

/// A node of the block chain.
#[derive(Debug)]
pub(crate) struct Block {
    pub(crate) superblock: SuperblockId,
    pub(crate) start: usize,
    pub(crate) len: usize,
    /// Physical ring.
    pub(crate) next: BlockId,
    pub(crate) prev: BlockId,
    /// Logical ring. Only meaningful while `protection` is empty.
    pub(crate) logical_next: BlockId,
    pub(crate) logical_prev: BlockId,
    /// Whether the tail has consumed this block since the head last entered it.
    pub(crate) tail_passed: bool,
    pub(crate) protection: Protections,
    /// First handle of this block's tracked-handle list.
    pub(crate) handles: Option<HandleId>,
}

impl Block {
    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.start + self.len
    }

    #[inline]
    pub(crate) fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end()
    }

    #[inline]
    pub(crate) fn is_protected(&self) -> bool {
        !self.protection.is_empty()
    }

    pub(crate) fn info(&self, id: BlockId) -> BlockInfo {
        BlockInfo {
            id,
            superblock: self.superblock,
            start: self.start,
            len: self.len,
            next: self.next,
            prev: self.prev,
            protection: self.protection.clone(),
            tail_passed: self.tail_passed,
        }
    }
}

/// Read-only snapshot of a block, for callers inspecting the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub id: BlockId,
    pub superblock: SuperblockId,
    /// First element index inside the superblock.
    pub start: usize,
    pub len: usize,
    pub next: BlockId,
    pub prev: BlockId,
    pub protection: Protections,
    pub tail_passed: bool,
}

impl BlockInfo {
    /// One past the last element index.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}
