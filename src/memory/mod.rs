//! Bit-addressable memory.
//!
//! [`Memory`] is a uniform byte-range abstraction over three backings:
//!
//! - **Growable** heap memory, read-write, owns a `Vec<u8>` and grows on
//!   demand by doubling (or to exactly fit the request if that is larger).
//! - **Heap** snapshots, read-only, share an `Arc<[u8]>`.
//! - **Mapped** file regions, read-only, share an `Arc<Mmap>`.
//!
//! All integer accessors are little-endian. Read-only instances reject
//! every mutating call with [`MemoryError::ReadOnly`] and may be sliced into
//! zero-copy views with [`Memory::view`]. Views are never created on
//! growable memory, since growth may relocate its allocation.
//!
//! `size` and `reserved_bytes` are distinct: `size` is the highest
//! `offset + width` ever written (or the full length of a read-only range),
//! `reserved_bytes` is the allocated capacity.  A mapped range reserves no
//! heap and reports `0`.
//!
//! # Bounds
//!
//! Accessors do not validate offsets against `size`.  Callers stay inside
//! the range; reading past the backing slice panics.
//!
//! # Releasing a mapping
//!
//! [`Memory::release`] consumes a handle.  For the handle that owns a
//! mapping it unmaps the region and fails with [`MemoryError::Unmap`] while
//! views created from it are still alive.  Once released, the region cannot
//! be reached through safe code.

#[cfg(test)]
mod tests;

use std::io::{self, Write};
use std::sync::Arc;

use memmap2::Mmap;
use thiserror::Error;
use tracing::{trace, warn};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Memory`] operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// A mutating call was made on a read-only instance.
    #[error("memory is read-only")]
    ReadOnly,

    /// Bulk copy between memory kinds that cannot be combined.
    #[error("cannot copy from {source_kind} memory into {target_kind} memory")]
    IncompatibleCopy {
        /// Kind of the source instance.
        source_kind: &'static str,
        /// Kind of the destination instance.
        target_kind: &'static str,
    },

    /// Views are only available on read-only memory.
    #[error("views are not supported on growable memory")]
    ViewOfGrowable,

    /// A view was requested outside the instance's range.
    #[error("view [{offset}, {offset}+{length}) exceeds memory of {size} bytes")]
    ViewOutOfRange {
        /// Requested start.
        offset: usize,
        /// Requested length.
        length: usize,
        /// Size of the instance.
        size: usize,
    },

    /// The mapping could not be released because other handles still share it.
    #[error("cannot unmap region: {outstanding} view(s) still reference it")]
    Unmap {
        /// Number of other live handles.
        outstanding: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Memory
// ------------------------------------------------------------------------------------------------

/// Capability of a [`Memory`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Mutating calls fail.
    ReadOnly,
    /// Mutating calls are allowed and may grow the allocation.
    ReadWrite,
}

#[derive(Debug)]
enum Backing {
    Growable {
        bytes: Vec<u8>,
        size: usize,
    },
    Heap {
        bytes: Arc<[u8]>,
        base: usize,
        len: usize,
    },
    Mapped {
        map: Arc<Mmap>,
        base: usize,
        len: usize,
        owner: bool,
    },
}

/// A little-endian, bit-addressable byte range.
#[derive(Debug)]
pub struct Memory {
    backing: Backing,
}

impl Memory {
    /// Creates growable read-write memory with `capacity` zeroed bytes reserved.
    pub fn growable(capacity: usize) -> Self {
        Self {
            backing: Backing::Growable {
                bytes: vec![0u8; capacity],
                size: 0,
            },
        }
    }

    /// Wraps owned bytes as read-only heap memory.
    pub fn read_only(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self {
            backing: Backing::Heap {
                bytes: Arc::from(bytes),
                base: 0,
                len,
            },
        }
    }

    /// Wraps a read-only file mapping. The returned handle owns the mapping.
    pub fn mapped(map: Mmap) -> Self {
        let len = map.len();
        Self {
            backing: Backing::Mapped {
                map: Arc::new(map),
                base: 0,
                len,
                owner: true,
            },
        }
    }

    pub fn access_mode(&self) -> AccessMode {
        match self.backing {
            Backing::Growable { .. } => AccessMode::ReadWrite,
            Backing::Heap { .. } | Backing::Mapped { .. } => AccessMode::ReadOnly,
        }
    }

    /// Highest written `offset + width` for growable memory, full range
    /// length for read-only memory.
    pub fn size(&self) -> usize {
        match &self.backing {
            Backing::Growable { size, .. } => *size,
            Backing::Heap { len, .. } | Backing::Mapped { len, .. } => *len,
        }
    }

    /// Bytes allocated on the heap for this instance.
    pub fn reserved_bytes(&self) -> usize {
        match &self.backing {
            Backing::Growable { bytes, .. } => bytes.len(),
            Backing::Heap { len, .. } => *len,
            Backing::Mapped { .. } => 0,
        }
    }

    fn kind(&self) -> &'static str {
        match self.backing {
            Backing::Growable { .. } => "growable",
            Backing::Heap { .. } => "heap",
            Backing::Mapped { .. } => "mapped",
        }
    }

    /// The readable bytes. For growable memory this is the whole reservation,
    /// including the zeroed tail beyond `size`.
    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Growable { bytes, .. } => bytes,
            Backing::Heap { bytes, base, len } => &bytes[*base..*base + *len],
            Backing::Mapped { map, base, len, .. } => &map[*base..*base + *len],
        }
    }

    // --------------------------------------------------------------------------------------------
    // Reads
    // --------------------------------------------------------------------------------------------

    /// Reads 8 bytes at `offset`.
    #[inline]
    pub fn get_long(&self, offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.as_slice()[offset..offset + 8]);
        u64::from_le_bytes(raw)
    }

    /// Reads `width` (1..=8) bytes at `offset`, zero-extended.
    #[inline]
    pub fn get_long_n(&self, offset: usize, width: usize) -> u64 {
        debug_assert!((1..=8).contains(&width));
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(&self.as_slice()[offset..offset + width]);
        u64::from_le_bytes(raw)
    }

    /// Reads 4 bytes at `offset`.
    #[inline]
    pub fn get_int(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.as_slice()[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    // --------------------------------------------------------------------------------------------
    // Writes
    // --------------------------------------------------------------------------------------------

    /// Writes 8 bytes at `offset`, growing the allocation if needed.
    #[inline]
    pub fn set_long(&mut self, offset: usize, value: u64) -> Result<(), MemoryError> {
        self.set_long_n(offset, value, 8)
    }

    /// Writes the low `width` (1..=8) bytes of `value` at `offset`.
    pub fn set_long_n(&mut self, offset: usize, value: u64, width: usize) -> Result<(), MemoryError> {
        debug_assert!((1..=8).contains(&width));
        let end = offset + width;
        let (bytes, size) = self.writable(end)?;
        bytes[offset..end].copy_from_slice(&value.to_le_bytes()[..width]);
        *size = (*size).max(end);
        Ok(())
    }

    /// Zeroes every reserved byte. Size is left unchanged.
    pub fn clear(&mut self) -> Result<(), MemoryError> {
        match &mut self.backing {
            Backing::Growable { bytes, .. } => {
                bytes.fill(0);
                Ok(())
            }
            _ => Err(MemoryError::ReadOnly),
        }
    }

    /// Copies `length` bytes from `source[source_offset..]` to `self[offset..]`.
    ///
    /// Only growable-to-growable copies are supported.
    pub fn copy(
        &mut self,
        offset: usize,
        source: &Memory,
        source_offset: usize,
        length: usize,
    ) -> Result<(), MemoryError> {
        if self.access_mode() == AccessMode::ReadOnly {
            return Err(MemoryError::ReadOnly);
        }
        if source.access_mode() != AccessMode::ReadWrite {
            return Err(MemoryError::IncompatibleCopy {
                source_kind: source.kind(),
                target_kind: self.kind(),
            });
        }
        let end = offset + length;
        let src = &source.as_slice()[source_offset..source_offset + length];
        let (bytes, size) = self.writable(end)?;
        bytes[offset..end].copy_from_slice(src);
        *size = (*size).max(end);
        Ok(())
    }

    /// Grows a growable backing to hold `required` bytes and hands out its parts.
    fn writable(&mut self, required: usize) -> Result<(&mut Vec<u8>, &mut usize), MemoryError> {
        match &mut self.backing {
            Backing::Growable { bytes, size } => {
                if required > bytes.len() {
                    let new_len = required.max(bytes.len() * 2);
                    trace!(from = bytes.len(), to = new_len, "growing heap memory");
                    bytes.resize(new_len, 0);
                }
                Ok((bytes, size))
            }
            _ => Err(MemoryError::ReadOnly),
        }
    }

    // --------------------------------------------------------------------------------------------
    // Views and persistence
    // --------------------------------------------------------------------------------------------

    /// Creates a zero-copy read-only view of `[offset, offset + length)`.
    pub fn view(&self, offset: usize, length: usize) -> Result<Memory, MemoryError> {
        let size = self.size();
        if offset.checked_add(length).is_none_or(|end| end > size) {
            return Err(MemoryError::ViewOutOfRange {
                offset,
                length,
                size,
            });
        }
        let backing = match &self.backing {
            Backing::Growable { .. } => return Err(MemoryError::ViewOfGrowable),
            Backing::Heap { bytes, base, .. } => Backing::Heap {
                bytes: Arc::clone(bytes),
                base: base + offset,
                len: length,
            },
            Backing::Mapped { map, base, .. } => Backing::Mapped {
                map: Arc::clone(map),
                base: base + offset,
                len: length,
                owner: false,
            },
        };
        Ok(Memory { backing })
    }

    /// Writes every readable byte to `out`.
    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self.as_slice())
    }

    /// Writes `[offset, offset + length)` to `out`.
    pub fn write_range_to(&self, out: &mut dyn Write, offset: usize, length: usize) -> io::Result<()> {
        out.write_all(&self.as_slice()[offset..offset + length])
    }

    /// Releases this handle.
    ///
    /// Dropping a view or a heap instance always succeeds.  Releasing the
    /// owner of a mapping unmaps it, unless views are still alive, in which
    /// case the mapping stays valid for them and [`MemoryError::Unmap`] is
    /// returned.
    pub fn release(self) -> Result<(), MemoryError> {
        match self.backing {
            Backing::Mapped {
                map, owner: true, ..
            } => match Arc::try_unwrap(map) {
                Ok(map) => {
                    drop(map);
                    trace!("mapping released");
                    Ok(())
                }
                Err(shared) => {
                    let outstanding = Arc::strong_count(&shared) - 1;
                    warn!(outstanding, "mapping still referenced, not unmapped");
                    Err(MemoryError::Unmap { outstanding })
                }
            },
            _ => Ok(()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Sequential reader
// ------------------------------------------------------------------------------------------------

/// A forward-only cursor over a [`Memory`] instance, used to parse headers
/// and carve payload views out of a mapped file.
pub struct MemoryReader<'a> {
    memory: &'a Memory,
    position: usize,
}

impl<'a> MemoryReader<'a> {
    pub fn new(memory: &'a Memory) -> Self {
        Self {
            memory,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left between the cursor and the end of the memory.
    pub fn remaining(&self) -> usize {
        self.memory.size().saturating_sub(self.position)
    }

    /// Returns the unread bytes without advancing.
    pub fn peek(&self) -> &'a [u8] {
        &self.memory.as_slice()[self.position.min(self.memory.size())..]
    }

    /// Advances the cursor by `length` bytes.
    pub fn skip(&mut self, length: usize) {
        self.position += length;
    }

    /// Creates a view of the next `length` bytes and advances past them.
    pub fn create_view(&mut self, length: usize) -> Result<Memory, MemoryError> {
        let view = self.memory.view(self.position, length)?;
        self.position += length;
        Ok(view)
    }
}
