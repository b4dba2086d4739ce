//! Cursor motion between blocks.
//!
//! The tail follows physical order and skips blocks that hold nothing
//! unread. The head follows the logical ring, so it never enters a
//! protected block.

use tracing::trace;

use crate::block::BlockId;
use crate::buffer::BlockCirclebuf;
use crate::handle::Position;

impl<T> BlockCirclebuf<T> {
    /// First block after `from`, in physical order, that can hold stream
    /// data: the head's block, `stop`, or a block with unread contents.
    pub(crate) fn stream_successor(&self, from: BlockId, stop: BlockId) -> BlockId {
        let head_block = self.head_pos().block;
        let mut current = self.blocks[from.0].next;
        while current != from {
            let block = &self.blocks[current.0];
            if current == head_block || current == stop || !block.tail_passed {
                return current;
            }
            current = block.next;
        }
        from
    }

    /// First block after `from` in the order the head wrote it: physical
    /// order, read or not, minus frozen blocks with nothing unread. The head
    /// stepped over those, so they hold no data of this lap.
    pub(crate) fn sequence_successor(&self, from: BlockId, stop: BlockId) -> BlockId {
        let mut current = self.blocks[from.0].next;
        while current != from {
            let block = &self.blocks[current.0];
            if current == stop || !block.is_protected() || !block.tail_passed {
                return current;
            }
            current = block.next;
        }
        from
    }

    /// Move the tail from the end of its block to the start of the next
    /// block holding stream data.
    pub(crate) fn advance_tail_to_next_block(&mut self) {
        let from = self.tail_pos().block;
        let head_block = self.head_pos().block;
        let to = self.stream_successor(from, head_block);

        if to != from {
            // Whatever the tail leaves behind is either read or the
            // wrapped part in front of the head.
            self.blocks[from.0].tail_passed = from != head_block;
        }
        let start = self.blocks[to.0].start;
        self.blocks[to.0].tail_passed = true;
        self.relocate_handle(
            self.tail,
            Position {
                block: to,
                index: start,
            },
        );
        trace!(start, "Tail advanced to next block");
    }

    /// Move the head from the end of its block to the start of the next
    /// block in the logical ring. Returns how many unread elements were
    /// lost because the tail sat in protected blocks the head jumped over.
    pub(crate) fn advance_head_to_next_block(&mut self) -> usize {
        let from = self.head_pos().block;
        let to = self.blocks[from.0].logical_next;

        let mut skipped = Vec::new();
        let mut current = self.blocks[from.0].next;
        while current != to && current != from {
            skipped.push(current);
            current = self.blocks[current.0].next;
        }

        let mut displaced = 0;
        while skipped.contains(&self.tail_pos().block) {
            let tail = self.tail_pos();
            displaced += self.blocks[tail.block.0].end() - tail.index;
            self.advance_tail_to_next_block();
        }

        let start = self.blocks[to.0].start;
        if to != from {
            // Without the tail in it, the block left behind is entirely unread.
            self.blocks[from.0].tail_passed = self.tail_pos().block == from;
        }
        self.blocks[to.0].tail_passed = false;
        self.relocate_handle(
            self.head,
            Position {
                block: to,
                index: start,
            },
        );
        trace!(start, displaced, "Head advanced to next block");
        displaced
    }
}
