//! Position handles tracked per block.
//!
//! Every handle sits on an intrusive, id-linked list rooted at the block it
//! points into. Splits and merges walk that list to repoint exactly the
//! handles whose block changed; nothing else has to be scanned.

use crate::arena::Key;
use crate::block::BlockId;
use crate::buffer::BlockCirclebuf;
use crate::error::{BufferError, BufferResult};

/// Id of a tracked position handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub(crate) Key);

impl HandleId {
    pub(crate) const DANGLING: HandleId = HandleId(Key::DANGLING);
}

/// A position in the buffer: a block plus an absolute element index inside
/// that block's superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub block: BlockId,
    pub index: usize,
}

#[derive(Debug)]
pub(crate) struct TrackedHandle {
    pub(crate) position: Position,
    prev: Option<HandleId>,
    next: Option<HandleId>,
}

impl<T> BlockCirclebuf<T> {
    /// Register a handle without validating its position.
    pub(crate) fn register_handle(&mut self, position: Position) -> HandleId {
        let id = HandleId(self.handles.insert(TrackedHandle {
            position,
            prev: None,
            next: None,
        }));
        self.link_handle(id, position.block);
        id
    }

    /// Push a handle onto the front of a block's list.
    fn link_handle(&mut self, id: HandleId, block: BlockId) {
        let first = self.blocks[block.0].handles;
        {
            let handle = &mut self.handles[id.0];
            handle.prev = None;
            handle.next = first;
        }
        if let Some(first) = first {
            self.handles[first.0].prev = Some(id);
        }
        self.blocks[block.0].handles = Some(id);
    }

    fn unlink_handle(&mut self, id: HandleId) {
        let (block, prev, next) = {
            let handle = &self.handles[id.0];
            (handle.position.block, handle.prev, handle.next)
        };
        match prev {
            Some(prev) => self.handles[prev.0].next = next,
            None => self.blocks[block.0].handles = next,
        }
        if let Some(next) = next {
            self.handles[next.0].prev = prev;
        }
        let handle = &mut self.handles[id.0];
        handle.prev = None;
        handle.next = None;
    }

    /// Move a handle, relinking only when it changes block.
    pub(crate) fn relocate_handle(&mut self, id: HandleId, position: Position) {
        let current = self.handles[id.0].position.block;
        if current != position.block {
            self.unlink_handle(id);
            self.handles[id.0].position = position;
            self.link_handle(id, position.block);
        } else {
            self.handles[id.0].position = position;
        }
    }

    /// Handles currently pointing into `block`.
    pub(crate) fn handle_list(&self, block: BlockId) -> Vec<HandleId> {
        let mut out = Vec::new();
        let mut current = self.blocks[block.0].handles;
        while let Some(id) = current {
            out.push(id);
            current = self.handles[id.0].next;
        }
        out
    }

    /// Check that `position` names a live block and lies inside it.
    pub fn validate(&self, position: Position) -> BufferResult<()> {
        let block = self.block(position.block)?;
        if !block.contains(position.index) {
            return Err(BufferError::OutOfRange {
                index: position.index,
                start: block.start,
                end: block.end(),
            });
        }
        Ok(())
    }

    /// Start tracking a position.
    pub fn track(&mut self, position: Position) -> BufferResult<HandleId> {
        self.validate(position)?;
        Ok(self.register_handle(position))
    }

    /// Track the current write position.
    pub fn track_head(&mut self) -> HandleId {
        let position = self.head_pos();
        self.register_handle(position)
    }

    /// Track the current read position.
    pub fn track_tail(&mut self) -> HandleId {
        let position = self.tail_pos();
        self.register_handle(position)
    }

    /// Track the same position as an existing handle.
    pub fn duplicate_handle(&mut self, id: HandleId) -> BufferResult<HandleId> {
        let position = self.handle_position(id)?;
        Ok(self.register_handle(position))
    }

    /// Where a handle currently points.
    pub fn handle_position(&self, id: HandleId) -> BufferResult<Position> {
        self.handles
            .get(id.0)
            .map(|handle| handle.position)
            .ok_or(BufferError::StaleHandle)
    }

    /// Repoint a caller-owned handle.
    pub fn move_handle(&mut self, id: HandleId, position: Position) -> BufferResult<()> {
        if id == self.head || id == self.tail {
            return Err(BufferError::ReservedHandle);
        }
        if !self.handles.contains(id.0) {
            return Err(BufferError::StaleHandle);
        }
        self.validate(position)?;
        self.relocate_handle(id, position);
        Ok(())
    }

    /// Stop tracking a caller-owned handle.
    pub fn release_handle(&mut self, id: HandleId) -> BufferResult<()> {
        if id == self.head || id == self.tail {
            return Err(BufferError::ReservedHandle);
        }
        if !self.handles.contains(id.0) {
            return Err(BufferError::StaleHandle);
        }
        self.unlink_handle(id);
        self.handles.remove(id.0);
        Ok(())
    }

    /// Handles currently pointing into a block, head and tail included.
    pub fn handles_in(&self, block: BlockId) -> BufferResult<Vec<HandleId>> {
        self.block(block)?;
        Ok(self.handle_list(block))
    }

    /// Id of the buffer-owned write cursor.
    pub fn head_handle(&self) -> HandleId {
        self.head
    }

    /// Id of the buffer-owned read cursor.
    pub fn tail_handle(&self) -> HandleId {
        self.tail
    }
}
