//! Chain surgery: splitting, merging, protection and superblock insertion.
//!
//! The physical ring links every block in memory-adjacency order. The
//! logical ring links the unprotected subset in the same order and is what
//! the write head rotates through.

use std::ops::Range;

use smallvec::{smallvec, SmallVec};
use tracing::{debug, info};

use crate::block::{Block, BlockId, ProtectionTag, Protections};
use crate::buffer::BlockCirclebuf;
use crate::error::{BufferError, BufferResult};
use crate::handle::{HandleId, Position};
use crate::superblock::{SuperblockAllocation, SuperblockId};

/// Live element ranges inside one block, sorted and coalesced.
pub(crate) type Spans = SmallVec<[Range<usize>; 2]>;

/// Live ranges of a block spanning `start..end` given which cursors sit in it.
///
/// With both cursors present, `tail_passed` tells whether the tail is behind
/// the head (live data is `t..h`) or ahead of it (live data wraps).
pub(crate) fn spans_for(
    start: usize,
    end: usize,
    tail: Option<usize>,
    head: Option<usize>,
    tail_passed: bool,
) -> Spans {
    let raw: Spans = match (tail, head) {
        (Some(t), Some(h)) if tail_passed => smallvec![t..h],
        (Some(t), Some(h)) => smallvec![t..end, start..h],
        (Some(t), None) => smallvec![t..end],
        (None, Some(h)) => smallvec![start..h],
        (None, None) if tail_passed => SmallVec::new(),
        (None, None) => smallvec![start..end],
    };
    normalize(raw)
}

pub(crate) fn normalize(mut spans: Spans) -> Spans {
    spans.retain(|span| !span.is_empty());
    spans.sort_by_key(|span| span.start);
    let mut out: Spans = SmallVec::new();
    for span in spans {
        match out.last_mut() {
            Some(last) if last.end >= span.start => last.end = last.end.max(span.end),
            _ => out.push(span),
        }
    }
    out
}

impl<T> BlockCirclebuf<T> {
    /// Live ranges currently held by a block.
    pub(crate) fn live_spans(&self, id: BlockId) -> Spans {
        let block = &self.blocks[id.0];
        let (head, tail) = (self.head_pos(), self.tail_pos());
        spans_for(
            block.start,
            block.end(),
            (tail.block == id).then_some(tail.index),
            (head.block == id).then_some(head.index),
            block.tail_passed,
        )
    }

    /// Nearest unprotected block strictly before `id` in physical order.
    fn unprotected_predecessor(&self, id: BlockId) -> BlockId {
        let mut current = self.blocks[id.0].prev;
        while self.blocks[current.0].is_protected() && current != id {
            current = self.blocks[current.0].prev;
        }
        current
    }

    /// Insert an unprotected block into the logical ring at its physical slot.
    fn link_logical(&mut self, id: BlockId) {
        let prev = self.unprotected_predecessor(id);
        if prev == id {
            let block = &mut self.blocks[id.0];
            block.logical_next = id;
            block.logical_prev = id;
            return;
        }
        let next = self.blocks[prev.0].logical_next;
        self.blocks[prev.0].logical_next = id;
        self.blocks[next.0].logical_prev = id;
        let block = &mut self.blocks[id.0];
        block.logical_prev = prev;
        block.logical_next = next;
    }

    fn unlink_logical(&mut self, id: BlockId) {
        let (prev, next) = {
            let block = &self.blocks[id.0];
            (block.logical_prev, block.logical_next)
        };
        self.blocks[prev.0].logical_next = next;
        self.blocks[next.0].logical_prev = prev;
        let block = &mut self.blocks[id.0];
        block.logical_next = id;
        block.logical_prev = id;
    }

    /// Split `block` so that `[at, end)` becomes a new block after it.
    ///
    /// Every handle at or past `at` moves to the new block. The live data
    /// described by both blocks is exactly what the old block described.
    pub fn split(&mut self, block: BlockId, at: usize) -> BufferResult<BlockId> {
        let b = self.block(block)?;
        if at <= b.start || at >= b.end() {
            return Err(BufferError::OutOfRange {
                index: at,
                start: b.start,
                end: b.end(),
            });
        }
        Ok(self.split_unchecked(block, at))
    }

    /// Split `block` at the position of a handle that points into it.
    pub fn split_at_handle(&mut self, block: BlockId, handle: HandleId) -> BufferResult<BlockId> {
        let position = self.handle_position(handle)?;
        if position.block != block {
            return Err(BufferError::ForeignHandle);
        }
        self.split(block, position.index)
    }

    /// Return the block starting exactly at `position`, splitting if needed.
    pub(crate) fn block_starting_at(&mut self, position: Position) -> BlockId {
        if self.blocks[position.block.0].start == position.index {
            position.block
        } else {
            self.split_unchecked(position.block, position.index)
        }
    }

    pub(crate) fn split_unchecked(&mut self, id: BlockId, at: usize) -> BlockId {
        #[cfg(debug_assertions)]
        let before = self.live_spans(id);

        let (head, tail) = (self.head_pos(), self.tail_pos());
        let old = &self.blocks[id.0];
        let (superblock, end, next, protection, passed) = (
            old.superblock,
            old.end(),
            old.next,
            old.protection.clone(),
            old.tail_passed,
        );
        let unprotected = protection.is_empty();

        let tail_here = (tail.block == id).then_some(tail.index);
        let head_here = (head.block == id).then_some(head.index);
        let (old_passed, new_passed) = match (tail_here, head_here) {
            (None, None) => (passed, passed),
            (Some(t), None) if t < at => (passed, false),
            (Some(_), None) => (true, true),
            (None, Some(h)) if h < at => (passed, true),
            (None, Some(_)) => (false, false),
            (Some(t), Some(h)) if passed => {
                if t < at && at <= h {
                    (true, false)
                } else {
                    (true, true)
                }
            }
            (Some(t), Some(h)) => {
                if h < at && at <= t {
                    (false, true)
                } else {
                    (false, false)
                }
            }
        };

        let new_id = BlockId(self.blocks.insert_with(|key| {
            let own = BlockId(key);
            Block {
                superblock,
                start: at,
                len: end - at,
                next,
                prev: id,
                logical_next: own,
                logical_prev: own,
                tail_passed: new_passed,
                protection,
                handles: None,
            }
        }));

        self.blocks[next.0].prev = new_id;
        {
            let old = &mut self.blocks[id.0];
            old.next = new_id;
            old.len = at - old.start;
            old.tail_passed = old_passed;
        }
        if unprotected {
            let logical_next = self.blocks[id.0].logical_next;
            self.blocks[logical_next.0].logical_prev = new_id;
            self.blocks[id.0].logical_next = new_id;
            let new_block = &mut self.blocks[new_id.0];
            new_block.logical_prev = id;
            new_block.logical_next = logical_next;
        }

        for handle in self.handle_list(id) {
            let index = self.handles[handle.0].position.index;
            if index >= at {
                self.relocate_handle(
                    handle,
                    Position {
                        block: new_id,
                        index,
                    },
                );
            }
        }

        #[cfg(debug_assertions)]
        {
            let mut after = self.live_spans(id);
            after.extend(self.live_spans(new_id));
            debug_assert_eq!(before, normalize(after), "split changed live data");
        }

        self.stats.splits += 1;
        debug!(at, new_len = end - at, "Block split");
        new_id
    }

    /// Merge `block` with its physical successor.
    pub fn attempt_reconcile_next(&mut self, block: BlockId) -> BufferResult<bool> {
        let next = self.block(block)?.next;
        Ok(self.try_merge(block, next))
    }

    /// Merge `block` into its physical predecessor.
    pub fn attempt_reconcile_prev(&mut self, block: BlockId) -> BufferResult<bool> {
        let prev = self.block(block)?.prev;
        Ok(self.try_merge(prev, block))
    }

    /// Merge `second` into `first` when they are adjacent views of the same
    /// superblock in the same protection state and a single block can
    /// describe their combined live data.
    pub(crate) fn try_merge(&mut self, first: BlockId, second: BlockId) -> bool {
        if first == second {
            return false;
        }
        let (a, b) = (&self.blocks[first.0], &self.blocks[second.0]);
        if a.next != second
            || a.superblock != b.superblock
            || a.end() != b.start
            || a.protection != b.protection
        {
            return false;
        }
        let (start, end, unprotected) = (a.start, b.end(), !a.is_protected());
        let (a_passed, b_passed) = (a.tail_passed, b.tail_passed);

        let mut target = self.live_spans(first);
        target.extend(self.live_spans(second));
        let target = normalize(target);

        let (head, tail) = (self.head_pos(), self.tail_pos());
        let in_pair = |block: BlockId| block == first || block == second;
        let t = in_pair(tail.block).then_some(tail.index);
        let h = in_pair(head.block).then_some(head.index);

        let candidates: SmallVec<[bool; 2]> = match (t, h) {
            (Some(_), None) => smallvec![true],
            (None, Some(_)) => smallvec![false],
            (None, None) => smallvec![a_passed],
            (Some(_), Some(_)) => smallvec![a_passed, !a_passed],
        };
        let Some(passed) = candidates
            .into_iter()
            .find(|&passed| spans_for(start, end, t, h, passed) == target)
        else {
            debug!(a_passed, b_passed, "Blocks not reconcilable yet");
            return false;
        };

        // Indices are absolute, so only the block changes.
        for handle in self.handle_list(second) {
            let index = self.handles[handle.0].position.index;
            self.relocate_handle(
                handle,
                Position {
                    block: first,
                    index,
                },
            );
        }

        let Some(absorbed) = self.blocks.remove(second.0) else {
            return false;
        };
        self.blocks[absorbed.next.0].prev = first;
        if unprotected {
            self.blocks[absorbed.logical_next.0].logical_prev = first;
        }
        {
            let survivor = &mut self.blocks[first.0];
            survivor.len += absorbed.len;
            survivor.next = absorbed.next;
            survivor.tail_passed = passed;
            if unprotected {
                survivor.logical_next = absorbed.logical_next;
            }
        }

        self.stats.merges += 1;
        debug!(len = end - start, "Blocks reconciled");
        true
    }

    /// Merge every reconcilable neighbour pair. Returns the longest
    /// unprotected block afterwards.
    pub(crate) fn reconcile_all(&mut self) -> usize {
        let ids: Vec<BlockId> = self.blocks.iter().map(|(key, _)| BlockId(key)).collect();
        for id in ids {
            while self.blocks.contains(id.0) {
                let next = self.blocks[id.0].next;
                if !self.try_merge(id, next) {
                    break;
                }
            }
        }
        self.blocks
            .iter()
            .filter(|(_, block)| !block.is_protected())
            .map(|(_, block)| block.len)
            .max()
            .unwrap_or(0)
    }

    /// Exclude a block from the write rotation. Its contents are preserved.
    pub fn protect_block(&mut self, block: BlockId) -> BufferResult<ProtectionTag> {
        if self.block(block)?.is_protected() {
            return Err(BufferError::AlreadyProtected);
        }
        let tag = self.fresh_tag();
        self.protect_with(block, tag)?;
        Ok(tag)
    }

    /// Add `tag` to a block, taking it out of the rotation if it was open.
    pub(crate) fn protect_with(&mut self, id: BlockId, tag: ProtectionTag) -> BufferResult<()> {
        if self.head_pos().block == id {
            return Err(BufferError::HeadInProtectedBlock);
        }
        let Err(slot) = self.blocks[id.0].protection.binary_search(&tag) else {
            return Err(BufferError::AlreadyProtected);
        };
        if !self.blocks[id.0].is_protected() {
            self.unlink_logical(id);
        }
        self.blocks[id.0].protection.insert(slot, tag);
        self.stats.protections += 1;
        debug!(tag = tag.0, "Block protected");
        Ok(())
    }

    /// Drop `tag` from a block. The block rejoins the rotation once no tag
    /// is left; returns whether it did.
    pub(crate) fn release_tag(&mut self, id: BlockId, tag: ProtectionTag) -> BufferResult<bool> {
        let protection = &mut self.block_mut(id)?.protection;
        let Ok(slot) = protection.binary_search(&tag) else {
            return Err(BufferError::NotProtected);
        };
        protection.remove(slot);
        if self.blocks[id.0].is_protected() {
            debug!(tag = tag.0, "Block still frozen by another tag");
            return Ok(false);
        }
        self.link_logical(id);
        debug!(tag = tag.0, "Block unprotected");
        Ok(true)
    }

    /// Return a protected block to the write rotation, whatever froze it.
    pub fn unprotect_block(&mut self, block: BlockId) -> BufferResult<()> {
        if !self.block(block)?.is_protected() {
            return Err(BufferError::NotProtected);
        }
        self.blocks[block.0].protection.clear();
        self.link_logical(block);
        debug!("Block unprotected");
        Ok(())
    }

    /// Whether a block is currently excluded from the rotation.
    pub fn is_protected(&self, block: BlockId) -> BufferResult<bool> {
        Ok(self.block(block)?.is_protected())
    }
}

impl<T: Copy + Default> BlockCirclebuf<T> {
    /// Allocate a new superblock and link its single block right after
    /// `after`. Holds no live data; no cursor moves.
    pub fn allocate_superblock(&mut self, size: usize, after: BlockId) -> BufferResult<BlockId> {
        let next = self.block(after)?.next;
        let allocation = SuperblockAllocation::allocate(size)?;
        let superblock = SuperblockId(self.superblocks.len());
        self.superblocks.push(allocation);

        let id = BlockId(self.blocks.insert_with(|key| {
            let own = BlockId(key);
            Block {
                superblock,
                start: 0,
                len: size,
                next,
                prev: after,
                logical_next: own,
                logical_prev: own,
                tail_passed: true,
                protection: Protections::new(),
                handles: None,
            }
        }));
        self.blocks[after.0].next = id;
        self.blocks[next.0].prev = id;
        self.link_logical(id);

        self.stats.superblocks += 1;
        info!(size, superblock = superblock.0, "Superblock allocated");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_normalize_coalesces() {
        let spans = normalize(smallvec![4..8, 0..0, 0..4]);
        assert_eq!(spans.as_slice(), &[0..8]);
    }

    #[test]
    fn test_spans_wrapped() {
        let spans = spans_for(0, 10, Some(6), Some(3), false);
        assert_eq!(spans.as_slice(), &[0..3, 6..10]);
        let full = spans_for(0, 10, Some(3), Some(3), false);
        assert_eq!(full.as_slice(), &[0..10]);
    }

    #[test]
    fn test_split_moves_handles_past_point() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let first = cb.head().block;
        let low = cb.track(Position { block: first, index: 1 }).unwrap();
        let high = cb.track(Position { block: first, index: 5 }).unwrap();
        let second = cb.split(first, 4).unwrap();

        assert_eq!(cb.handle_position(low).unwrap().block, first);
        assert_eq!(
            cb.handle_position(high).unwrap(),
            Position {
                block: second,
                index: 5
            }
        );
        let info = cb.block_info(first).unwrap();
        assert_eq!((info.start, info.len, info.next), (0, 4, second));
        let info = cb.block_info(second).unwrap();
        assert_eq!((info.start, info.len, info.next), (4, 4, first));
        assert_eq!(cb.logical_blocks(), vec![first, second]);
    }

    #[test]
    fn test_split_out_of_range() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let first = cb.head().block;
        assert!(matches!(
            cb.split(first, 0),
            Err(BufferError::OutOfRange { .. })
        ));
        assert!(matches!(
            cb.split(first, 8),
            Err(BufferError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_split_with_foreign_handle() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let first = cb.head().block;
        let second = cb.split(first, 4).unwrap();
        let handle = cb.track(Position { block: second, index: 6 }).unwrap();
        assert_eq!(
            cb.split_at_handle(first, handle),
            Err(BufferError::ForeignHandle)
        );
        assert!(cb.split_at_handle(second, handle).is_ok());
    }

    #[test]
    fn test_merge_restores_block_and_handles() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let first = cb.head().block;
        let handle = cb.track(Position { block: first, index: 6 }).unwrap();
        let second = cb.split(first, 4).unwrap();
        assert_eq!(cb.handle_position(handle).unwrap().block, second);

        assert!(cb.attempt_reconcile_prev(second).unwrap());
        assert_eq!(cb.block_count(), 1);
        assert_eq!(
            cb.handle_position(handle).unwrap(),
            Position {
                block: first,
                index: 6
            }
        );
        let info = cb.block_info(first).unwrap();
        assert_eq!((info.len, info.next, info.prev), (8, first, first));
        assert_eq!(cb.stats().merges, 1);
    }

    #[test]
    fn test_merge_with_self_fails() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let first = cb.head().block;
        assert!(!cb.attempt_reconcile_next(first).unwrap());
    }

    #[test]
    fn test_merge_across_superblocks_fails() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let first = cb.head().block;
        let extra = cb.allocate_superblock(8, first).unwrap();
        assert!(!cb.attempt_reconcile_next(first).unwrap());
        assert!(!cb.attempt_reconcile_next(extra).unwrap());
        assert_eq!(cb.block_count(), 2);
    }

    #[test]
    fn test_merge_requires_same_protection() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let first = cb.head().block;
        let second = cb.split(first, 4).unwrap();
        cb.protect_block(second).unwrap();
        assert!(!cb.attempt_reconcile_next(first).unwrap());
        cb.unprotect_block(second).unwrap();
        assert!(cb.attempt_reconcile_next(first).unwrap());
    }

    #[test]
    fn test_protect_unlinks_logical_ring() {
        let mut cb = BlockCirclebuf::<u8>::new(12).unwrap();
        let a = cb.head().block;
        let b = cb.split(a, 4).unwrap();
        let c = cb.split(b, 8).unwrap();
        assert_eq!(cb.logical_blocks(), vec![a, b, c]);

        cb.protect_block(b).unwrap();
        assert_eq!(cb.logical_blocks(), vec![a, c]);
        assert_eq!(cb.writable_capacity(), 8);
        assert_eq!(cb.protect_block(b), Err(BufferError::AlreadyProtected));

        cb.unprotect_block(b).unwrap();
        assert_eq!(cb.logical_blocks(), vec![a, b, c]);
        assert_eq!(cb.unprotect_block(b), Err(BufferError::NotProtected));
    }

    #[test]
    fn test_stacked_tags_hold_block_until_last_release() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let a = cb.head().block;
        let b = cb.split(a, 4).unwrap();
        let older = cb.protect_block(b).unwrap();
        let newer = cb.fresh_tag();
        cb.protect_with(b, newer).unwrap();
        assert_eq!(cb.block_info(b).unwrap().protection.as_slice(), &[older, newer]);
        assert_eq!(cb.protect_with(b, newer), Err(BufferError::AlreadyProtected));

        assert!(!cb.release_tag(b, older).unwrap());
        assert_eq!(cb.logical_blocks(), vec![a]);
        assert!(cb.release_tag(b, newer).unwrap());
        assert_eq!(cb.logical_blocks(), vec![a, b]);
        assert_eq!(cb.release_tag(b, newer), Err(BufferError::NotProtected));
    }

    #[test]
    fn test_cannot_protect_head_block() {
        let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
        let head = cb.head().block;
        assert_eq!(
            cb.protect_block(head),
            Err(BufferError::HeadInProtectedBlock)
        );
    }

    #[test]
    fn test_allocate_superblock_links_after() {
        let mut cb = BlockCirclebuf::<u8>::new(4).unwrap();
        let first = cb.head().block;
        let extra = cb.allocate_superblock(6, first).unwrap();
        let info = cb.block_info(extra).unwrap();
        assert_eq!((info.prev, info.next, info.len), (first, first, 6));
        assert_eq!(info.superblock.index(), 1);
        assert_eq!(cb.logical_blocks(), vec![first, extra]);
        assert_eq!(cb.capacity(), 10);
        assert_eq!(cb.superblock_count(), 2);
        assert!(cb.is_empty());
    }
}
