//! Streaming writes and reads, contiguous reservations and distance queries.

use tracing::{debug, trace};

use crate::block::BlockId;
use crate::buffer::BlockCirclebuf;
use crate::error::{BufferError, BufferResult};
use crate::handle::{HandleId, Position};

impl<T: Copy> BlockCirclebuf<T> {
    /// Append `data` at the head, overwriting the oldest data when the
    /// buffer is full. Always accepts every element.
    pub fn write(&mut self, data: &[T]) -> usize {
        let mut written = 0;
        while written < data.len() {
            let head = self.head_pos();
            let block = &self.blocks[head.block.0];
            let superblock = block.superblock;
            let chunk = (block.end() - head.index).min(data.len() - written);

            self.displace_for_overwrite(chunk);
            self.superblocks[superblock.0]
                .slice_mut(head.index, head.index + chunk)
                .copy_from_slice(&data[written..written + chunk]);
            self.commit_head(chunk);
            written += chunk;
        }
        written
    }

    /// Copy up to `out.len()` unread elements into `out`, returning how many
    /// were copied. Never reads past the head.
    pub fn read(&mut self, out: &mut [T]) -> usize {
        let count = out.len();
        let done = self.read_impl(Some(out), count);
        self.stats.read += done as u64;
        done
    }

    /// Discard up to `count` unread elements without copying them.
    pub fn skip(&mut self, count: usize) -> usize {
        let done = self.read_impl(None, count);
        self.stats.skipped += done as u64;
        done
    }

    fn read_impl(&mut self, mut out: Option<&mut [T]>, count: usize) -> usize {
        let mut done = 0;
        while done < count {
            let (head, tail) = (self.head_pos(), self.tail_pos());
            let block = &self.blocks[tail.block.0];
            let (superblock, end) = (block.superblock, block.end());
            let limit = if tail.block == head.block && block.tail_passed {
                head.index
            } else {
                end
            };
            let avail = (limit - tail.index).min(count - done);
            if avail == 0 {
                break;
            }

            if let Some(out) = out.as_deref_mut() {
                out[done..done + avail].copy_from_slice(
                    self.superblocks[superblock.0].slice(tail.index, tail.index + avail),
                );
            }
            done += avail;

            let index = tail.index + avail;
            if index == end {
                self.advance_tail_to_next_block();
            } else {
                self.relocate_handle(
                    self.tail,
                    Position {
                        block: tail.block,
                        index,
                    },
                );
            }
        }
        trace!(done, "Tail consumed");
        done
    }

    /// Reserve `count` contiguous elements at the head and commit them as
    /// written. The caller fills the returned slice in place.
    ///
    /// When the head block is too short the rest of it is split off and
    /// left behind. Fails without moving any cursor if no unprotected block
    /// could ever hold `count` elements.
    pub fn reserve(&mut self, count: usize) -> BufferResult<&mut [T]> {
        if count == 0 {
            return Ok(&mut []);
        }

        if self.head_room() < count {
            let largest = self.reconcile_all();
            if largest < count {
                return Err(BufferError::ReservationTooLarge {
                    requested: count,
                    largest,
                });
            }

            let mut attempts = 4 * self.blocks.len() + 4;
            while self.head_room() < count {
                if attempts == 0 {
                    return Err(BufferError::ReservationTooLarge {
                        requested: count,
                        largest: self.reconcile_all(),
                    });
                }
                attempts -= 1;

                let head = self.head_pos();
                let start = self.blocks[head.block.0].start;
                if head.index == start {
                    self.abandon_head_block();
                    self.reconcile_all();
                } else if self.is_empty() {
                    self.rewind_empty(Position {
                        block: head.block,
                        index: start,
                    });
                } else {
                    self.split_unchecked(head.block, head.index);
                }
            }
        }

        let head = self.head_pos();
        let superblock = self.blocks[head.block.0].superblock;
        self.displace_for_overwrite(count);
        self.commit_head(count);
        Ok(self.superblocks[superblock.0].slice_mut(head.index, head.index + count))
    }
}

impl<T> BlockCirclebuf<T> {
    fn head_room(&self) -> usize {
        let head = self.head_pos();
        self.blocks[head.block.0].end() - head.index
    }

    /// Push the tail out of `[h, h+count)` when it sits ahead of the head in
    /// the same block.
    fn displace_for_overwrite(&mut self, count: usize) {
        let (head, tail) = (self.head_pos(), self.tail_pos());
        if tail.block != head.block || self.blocks[tail.block.0].tail_passed {
            return;
        }
        let target = head.index + count;
        if target <= tail.index {
            return;
        }
        let displaced = target - tail.index;
        if target == self.blocks[tail.block.0].end() {
            self.advance_tail_to_next_block();
        } else {
            self.relocate_handle(
                self.tail,
                Position {
                    block: tail.block,
                    index: target,
                },
            );
        }
        self.stats.record_displaced(displaced);
        trace!(displaced, "Tail displaced by overwrite");
    }

    /// Mark `count` elements at the head as written.
    fn commit_head(&mut self, count: usize) {
        let head = self.head_pos();
        let index = head.index + count;
        self.stats.written += count as u64;
        if index == self.blocks[head.block.0].end() {
            let displaced = self.advance_head_to_next_block();
            self.stats.record_displaced(displaced);
        } else {
            self.relocate_handle(
                self.head,
                Position {
                    block: head.block,
                    index,
                },
            );
        }
    }

    /// Leave the head's block unwritten and move on. The head must sit at
    /// the block start.
    fn abandon_head_block(&mut self) {
        let abandoned = self.head_pos().block;
        let tail = self.tail_pos();
        let mut displaced = 0;

        // The tail's unread data in front of the head is given up with the block.
        if tail.block == abandoned && !self.blocks[abandoned.0].tail_passed {
            displaced += self.blocks[abandoned.0].end() - tail.index;
            self.advance_tail_to_next_block();
        }
        let caught_up = self.tail_pos().block == abandoned;

        displaced += self.advance_head_to_next_block();
        self.blocks[abandoned.0].tail_passed = true;
        if caught_up {
            let head = self.head_pos();
            self.blocks[head.block.0].tail_passed = true;
            self.relocate_handle(self.tail, head);
        }

        self.stats.record_displaced(displaced);
        debug!(displaced, caught_up, "Head block abandoned");
    }

    /// Move both cursors of an empty buffer to `position`.
    fn rewind_empty(&mut self, position: Position) {
        self.relocate_handle(self.head, position);
        self.relocate_handle(self.tail, position);
        self.blocks[position.block.0].tail_passed = true;
        trace!(index = position.index, "Empty buffer rewound");
    }

    /// Elements from `from` forward to `to`, stepping with `successor`.
    /// With `lap`, a same-block pair is measured the long way round.
    fn walk_distance(
        &self,
        from: Position,
        to: Position,
        lap: bool,
        successor: fn(&Self, BlockId, BlockId) -> BlockId,
    ) -> usize {
        if from.block == to.block && from.index <= to.index && !lap {
            return to.index - from.index;
        }
        let mut total = self.blocks[from.block.0].end() - from.index;
        let mut current = successor(self, from.block, to.block);
        while current != to.block {
            total += self.blocks[current.0].len;
            let next = successor(self, current, to.block);
            if next == current {
                break;
            }
            current = next;
        }
        total + (to.index - self.blocks[to.block.0].start)
    }

    /// Unread elements from `from` to `to`.
    fn stream_distance(&self, from: Position, to: Position, lap: bool) -> usize {
        self.walk_distance(from, to, lap, Self::stream_successor)
    }

    /// Elements written from `from` to `to`, whether read yet or not.
    pub(crate) fn sequence_distance(&self, from: Position, to: Position) -> usize {
        self.walk_distance(from, to, false, Self::sequence_successor)
    }

    /// Forward element count from handle `a` to handle `b`, counting data
    /// the reader has already consumed.
    pub fn ptr_difference(&self, a: HandleId, b: HandleId) -> BufferResult<usize> {
        let (from, to) = (self.handle_position(a)?, self.handle_position(b)?);
        Ok(self.sequence_distance(from, to))
    }

    /// Number of unread elements between tail and head.
    pub fn buffer_health(&self) -> usize {
        let (head, tail) = (self.head_pos(), self.tail_pos());
        if head.block == tail.block {
            if self.blocks[head.block.0].tail_passed {
                head.index - tail.index
            } else {
                self.stream_distance(tail, head, true)
            }
        } else {
            self.stream_distance(tail, head, false)
        }
    }
}
