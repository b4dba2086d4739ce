//! Freezing a span of the stream so it survives the write head.

use tracing::{debug, info};

use crate::block::{BlockId, ProtectionTag};
use crate::buffer::BlockCirclebuf;
use crate::error::{BufferError, BufferResult};
use crate::handle::{HandleId, Position};

/// A frozen span of the stream, from `start` up to `end`.
///
/// The handles are owned by the range and released with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRange {
    pub tag: ProtectionTag,
    pub start: HandleId,
    pub end: HandleId,
    pub len: usize,
}

impl<T> BlockCirclebuf<T> {
    /// Freeze the elements written in `[from, to)`, read or not.
    ///
    /// Both positions become block boundaries. A block already frozen by
    /// another range carries both tags and stays frozen until both ranges
    /// are released.
    pub fn protect_range(&mut self, from: Position, to: Position) -> BufferResult<ProtectedRange> {
        self.validate(from)?;
        self.validate(to)?;
        if from == to {
            return Err(BufferError::EmptyRange);
        }
        let len = self.sequence_distance(from, to);
        if self.sequence_distance(from, self.head_pos()) < len {
            return Err(BufferError::HeadInProtectedBlock);
        }

        let start = self.register_handle(from);
        let end = self.register_handle(to);
        let first = self.block_starting_at(from);
        let end_position = self.handles[end.0].position;
        let last = self.block_starting_at(end_position);

        let mut targets = Vec::new();
        let mut current = first;
        while current != last {
            targets.push(current);
            let next = self.sequence_successor(current, last);
            if next == current {
                break;
            }
            current = next;
        }
        if targets.iter().any(|&id| id == self.head_pos().block) {
            self.release_range_handles(start, end);
            return Err(BufferError::HeadInProtectedBlock);
        }

        let tag = self.fresh_tag();
        for &id in &targets {
            self.protect_with(id, tag)?;
        }

        info!(tag = tag.0, len, blocks = targets.len(), "Range protected");
        Ok(ProtectedRange {
            tag,
            start,
            end,
            len,
        })
    }

    /// Blocks frozen by `range`, in physical order from its start.
    pub fn range_blocks(&self, range: &ProtectedRange) -> BufferResult<Vec<BlockId>> {
        let first = self.handle_position(range.start)?.block;
        let last = self.handle_position(range.end)?.block;
        let mut out = Vec::new();
        let mut current = first;
        loop {
            if self.blocks[current.0].protection.contains(&range.tag) {
                out.push(current);
            }
            current = self.blocks[current.0].next;
            if current == last || current == first {
                break;
            }
        }
        Ok(out)
    }

    /// Drop the range's hold on its blocks. Blocks no other range holds go
    /// back to the rotation, and every block is merged with its neighbours
    /// where possible.
    pub fn release_range(&mut self, range: ProtectedRange) -> BufferResult<()> {
        let blocks = self.range_blocks(&range)?;
        let held = blocks.len();
        let mut reopened = 0;
        for &id in &blocks {
            if self.release_tag(id, range.tag)? {
                reopened += 1;
            }
        }
        self.release_range_handles(range.start, range.end);

        for id in blocks {
            if !self.blocks.contains(id.0) {
                continue;
            }
            while self.attempt_reconcile_next(id)? {}
            let prev = self.blocks[id.0].prev;
            self.try_merge(prev, id);
        }

        info!(
            tag = range.tag.0,
            blocks = held,
            reopened,
            "Range released"
        );
        Ok(())
    }

    fn release_range_handles(&mut self, start: HandleId, end: HandleId) {
        for handle in [start, end] {
            if let Err(err) = self.release_handle(handle) {
                debug!(%err, "Range handle already released");
            }
        }
    }
}

impl<T: Copy> BlockCirclebuf<T> {
    /// Append the frozen elements of `range` to `out` in stream order.
    /// No cursor moves.
    pub fn read_range(&self, range: &ProtectedRange, out: &mut Vec<T>) -> BufferResult<usize> {
        let before = out.len();
        for id in self.range_blocks(range)? {
            out.extend_from_slice(self.block_contents(id)?);
        }
        Ok(out.len() - before)
    }
}
