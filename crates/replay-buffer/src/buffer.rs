//! The buffer itself: storage, chain arenas and the head/tail cursors.

use tracing::info;

use crate::arena::Arena;
use crate::block::{Block, BlockId, BlockInfo, ProtectionTag, Protections};
use crate::error::{BufferError, BufferResult};
use crate::handle::{HandleId, Position, TrackedHandle};
use crate::stats::BufferStats;
use crate::superblock::{SuperblockAllocation, SuperblockId};

/// Circular buffer spread over one or more blocks.
///
/// Blocks can be split in O(1), excluded from the write rotation while their
/// contents are preserved, and merged back once their neighbours agree on what
/// data is live. Position handles survive all of this.
///
/// The buffer assumes a single logical writer and reader; it holds no locks.
#[derive(Debug)]
pub struct BlockCirclebuf<T> {
    pub(crate) superblocks: Vec<SuperblockAllocation<T>>,
    pub(crate) blocks: Arena<Block>,
    pub(crate) handles: Arena<TrackedHandle>,
    pub(crate) head: HandleId,
    pub(crate) tail: HandleId,
    pub(crate) next_tag: u64,
    pub(crate) stats: BufferStats,
}

impl<T: Copy + Default> BlockCirclebuf<T> {
    /// Create a buffer backed by a single superblock of `capacity` elements.
    pub fn new(capacity: usize) -> BufferResult<Self> {
        let allocation = SuperblockAllocation::allocate(capacity)?;

        let mut blocks = Arena::new();
        let first = BlockId(blocks.insert_with(|key| {
            let id = BlockId(key);
            Block {
                superblock: SuperblockId(0),
                start: 0,
                len: capacity,
                next: id,
                prev: id,
                logical_next: id,
                logical_prev: id,
                tail_passed: true,
                protection: Protections::new(),
                handles: None,
            }
        }));

        // Placeholder ids, replaced as soon as the handles are registered.
        let mut buffer = Self {
            superblocks: vec![allocation],
            blocks,
            handles: Arena::new(),
            head: HandleId::DANGLING,
            tail: HandleId::DANGLING,
            next_tag: 0,
            stats: BufferStats {
                superblocks: 1,
                ..Default::default()
            },
        };

        let origin = Position {
            block: first,
            index: 0,
        };
        buffer.head = buffer.register_handle(origin);
        buffer.tail = buffer.register_handle(origin);

        info!(capacity, "Block circular buffer created");
        Ok(buffer)
    }
}

impl<T> BlockCirclebuf<T> {
    /// Look up a block, rejecting stale ids.
    pub(crate) fn block(&self, id: BlockId) -> BufferResult<&Block> {
        self.blocks.get(id.0).ok_or(BufferError::StaleBlock)
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> BufferResult<&mut Block> {
        self.blocks.get_mut(id.0).ok_or(BufferError::StaleBlock)
    }

    #[inline]
    pub(crate) fn head_pos(&self) -> Position {
        self.handles[self.head.0].position
    }

    #[inline]
    pub(crate) fn tail_pos(&self) -> Position {
        self.handles[self.tail.0].position
    }

    pub(crate) fn fresh_tag(&mut self) -> ProtectionTag {
        let tag = ProtectionTag(self.next_tag);
        self.next_tag += 1;
        tag
    }

    /// Current write position.
    pub fn head(&self) -> Position {
        self.head_pos()
    }

    /// Oldest unread position.
    pub fn tail(&self) -> Position {
        self.tail_pos()
    }

    /// Whether there is no unread data.
    pub fn is_empty(&self) -> bool {
        let (head, tail) = (self.head_pos(), self.tail_pos());
        head == tail && self.blocks[head.block.0].tail_passed
    }

    /// Total elements across every superblock, protected or not.
    pub fn capacity(&self) -> usize {
        self.superblocks.iter().map(|sb| sb.len()).sum()
    }

    /// Elements in blocks currently open to the write head.
    pub fn writable_capacity(&self) -> usize {
        self.blocks
            .iter()
            .filter(|(_, block)| !block.is_protected())
            .map(|(_, block)| block.len)
            .sum()
    }

    /// Number of blocks in the chain.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of superblock allocations.
    pub fn superblock_count(&self) -> usize {
        self.superblocks.len()
    }

    /// Snapshot of one block.
    pub fn block_info(&self, id: BlockId) -> BufferResult<BlockInfo> {
        Ok(self.block(id)?.info(id))
    }

    /// Every block in physical order, starting from the head's block.
    pub fn blocks(&self) -> Vec<BlockInfo> {
        let first = self.head_pos().block;
        let mut out = Vec::with_capacity(self.blocks.len());
        let mut current = first;
        loop {
            let block = &self.blocks[current.0];
            out.push(block.info(current));
            current = block.next;
            if current == first {
                break;
            }
        }
        out
    }

    /// Blocks in the write rotation, starting from the head's block.
    pub fn logical_blocks(&self) -> Vec<BlockId> {
        let first = self.head_pos().block;
        let mut out = vec![first];
        let mut current = self.blocks[first.0].logical_next;
        while current != first {
            out.push(current);
            current = self.blocks[current.0].logical_next;
        }
        out
    }

    /// The stored elements of a block, regardless of liveness.
    pub fn block_contents(&self, id: BlockId) -> BufferResult<&[T]> {
        let block = self.block(id)?;
        Ok(self.superblocks[block.superblock.0].slice(block.start, block.end()))
    }

    /// Cumulative counters.
    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }
}
