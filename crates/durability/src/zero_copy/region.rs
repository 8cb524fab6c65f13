//! Fixed-capacity bump allocation over aligned storage.

use bytemuck::{Pod, PodCastError};
use std::mem::{align_of, size_of};
use vellum_core::{Error, Result};

/// Byte storage backing a [`MemoryRegion`].
///
/// Implementations must keep the start of `bytes()` aligned to at least 8.
pub trait RegionStorage {
    /// The whole storage.
    fn bytes(&self) -> &[u8];

    /// The whole storage, mutably.
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// Zeroed heap buffer with an 8-byte aligned base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedBuffer {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBuffer {
    /// Allocate `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        AlignedBuffer {
            words: vec![0u64; (len + 7) / 8],
            len,
        }
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl RegionStorage for AlignedBuffer {
    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.words)[..self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.words)[..self.len]
    }
}

/// Bump allocator over a fixed-capacity [`RegionStorage`].
///
/// Allocations are laid out contiguously, each rounded up to the alignment of
/// its type. Nothing is freed individually; [`reset`](Self::reset) clears the
/// whole region.
#[derive(Debug)]
pub struct MemoryRegion<S: RegionStorage = AlignedBuffer> {
    storage: S,
    used: usize,
}

impl MemoryRegion<AlignedBuffer> {
    /// Create a heap-backed region of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self::with_storage(AlignedBuffer::zeroed(capacity))
    }
}

impl<S: RegionStorage> MemoryRegion<S> {
    /// Wrap existing storage; allocation starts at offset 0.
    pub fn with_storage(storage: S) -> Self {
        MemoryRegion { storage, used: 0 }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.bytes().len()
    }

    /// Bytes allocated, including alignment padding.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.capacity() - self.used
    }

    /// Reserve `size` bytes at the next multiple of `align`; returns the offset.
    ///
    /// `align` must be a power of two.
    pub fn allocate_offset(&mut self, size: usize, align: usize) -> Result<usize> {
        debug_assert!(align.is_power_of_two());
        let remaining = self.remaining();
        let padding = (align - self.used % align) % align;
        let requested = padding.saturating_add(size);
        if requested > remaining {
            return Err(Error::MemoryRegionExhausted {
                requested,
                remaining,
            });
        }
        let offset = self.used + padding;
        self.used = offset + size;
        Ok(offset)
    }

    /// Allocate one zeroed `T`.
    pub fn allocate<T: Pod>(&mut self) -> Result<&mut T> {
        let offset = self.allocate_offset(size_of::<T>(), align_of::<T>())?;
        let bytes = &mut self.storage.bytes_mut()[offset..offset + size_of::<T>()];
        bytemuck::try_from_bytes_mut(bytes).map_err(|e| cast_error(e, offset, align_of::<T>()))
    }

    /// Allocate `count` contiguous zeroed `T`s.
    pub fn allocate_array<T: Pod>(&mut self, count: usize) -> Result<&mut [T]> {
        let size = count
            .checked_mul(size_of::<T>())
            .ok_or(Error::MemoryRegionExhausted {
                requested: usize::MAX,
                remaining: self.remaining(),
            })?;
        let offset = self.allocate_offset(size, align_of::<T>())?;
        let bytes = &mut self.storage.bytes_mut()[offset..offset + size];
        bytemuck::try_cast_slice_mut(bytes).map_err(|e| cast_error(e, offset, align_of::<T>()))
    }

    /// Allocate `len` bytes with no alignment requirement.
    pub fn allocate_bytes(&mut self, len: usize) -> Result<&mut [u8]> {
        let offset = self.allocate_offset(len, 1)?;
        Ok(&mut self.storage.bytes_mut()[offset..offset + len])
    }

    /// Typed view of allocated bytes at `offset`.
    pub fn get_at<T: Pod>(&self, offset: usize) -> Result<&T> {
        let bytes = self.span(offset, size_of::<T>())?;
        bytemuck::try_from_bytes(bytes).map_err(|e| cast_error(e, offset, align_of::<T>()))
    }

    /// Mutable typed view of allocated bytes at `offset`.
    pub fn get_at_mut<T: Pod>(&mut self, offset: usize) -> Result<&mut T> {
        let bytes = self.span_mut(offset, size_of::<T>())?;
        bytemuck::try_from_bytes_mut(bytes).map_err(|e| cast_error(e, offset, align_of::<T>()))
    }

    /// The allocated prefix of the storage.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage.bytes()[..self.used]
    }

    /// Zero the allocated bytes and start over.
    pub fn reset(&mut self) {
        let used = self.used;
        self.storage.bytes_mut()[..used].fill(0);
        self.used = 0;
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Give back the storage.
    pub fn into_storage(self) -> S {
        self.storage
    }

    pub(crate) fn span(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.saturating_add(len);
        if end > self.used {
            return Err(Error::underflow(len, self.used.saturating_sub(offset)));
        }
        Ok(&self.storage.bytes()[offset..end])
    }

    pub(crate) fn span_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let end = offset.saturating_add(len);
        if end > self.used {
            return Err(Error::underflow(len, self.used.saturating_sub(offset)));
        }
        Ok(&mut self.storage.bytes_mut()[offset..end])
    }
}

pub(crate) fn cast_error(e: PodCastError, offset: usize, align: usize) -> Error {
    match e {
        PodCastError::TargetAlignmentGreaterAndInputNotAligned
        | PodCastError::AlignmentMismatch => Error::Misaligned { offset, align },
        other => Error::InvalidData(format!("cast at offset {} failed: {:?}", offset, other)),
    }
}
