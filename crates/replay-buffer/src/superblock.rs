//! Owned superblock allocations.

use crate::error::{BufferError, BufferResult};

/// Identifies one superblock by its creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SuperblockId(pub(crate) usize);

impl SuperblockId {
    /// Creation-order index of this superblock.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One contiguous allocation that blocks are carved from.
#[derive(Debug)]
pub(crate) struct SuperblockAllocation<T> {
    data: Box<[T]>,
}

impl<T: Copy + Default> SuperblockAllocation<T> {
    /// Allocate `size` default-initialised elements.
    ///
    /// Allocation failure is reported, never retried.
    pub(crate) fn allocate(size: usize) -> BufferResult<Self> {
        if size == 0 {
            return Err(BufferError::InvalidCapacity);
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| BufferError::OutOfMemory { requested: size })?;
        data.resize(size, T::default());

        Ok(Self {
            data: data.into_boxed_slice(),
        })
    }
}

impl<T> SuperblockAllocation<T> {
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn slice(&self, start: usize, end: usize) -> &[T] {
        &self.data[start..end]
    }

    pub(crate) fn slice_mut(&mut self, start: usize, end: usize) -> &mut [T] {
        &mut self.data[start..end]
    }
}
