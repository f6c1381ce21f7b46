//! Fixed-width little-endian binary encoding for the on-disk headers.
//!
//! The sketch file and the batch header are plain sequences of fixed-width
//! integers, so this module only needs a handful of primitive codecs plus
//! two sequence helpers.  Because the crate owns the format, the on-disk
//! representation never changes due to a dependency upgrade.
//!
//! # Wire format
//!
//! | Rust type            | Encoding                                   |
//! |----------------------|--------------------------------------------|
//! | `u8`                 | 1 byte                                     |
//! | `u32`                | 4 bytes, little-endian                     |
//! | `u64`                | 8 bytes, little-endian                     |
//! | `[T]` (counted)      | `[u32 count][T₁][T₂]…`                     |
//! | `[T]` (fixed count)  | `[T₁][T₂]…`, count known from context      |
//!
//! # Safety limits
//!
//! [`MAX_SEQ_ELEMENTS`] bounds every decoded element count so that a
//! corrupted header cannot trigger an allocation bomb.
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()`, `expect()`, or any other
//! panicking path.  All errors are propagated via [`EncodingError`].

#[cfg(test)]
mod tests;

use std::io::{self, Read};

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Safety limits
// ------------------------------------------------------------------------------------------------

/// Maximum element count accepted for a decoded sequence (16 M).
pub const MAX_SEQ_ELEMENTS: u32 = 16 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during encoding or decoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A length or count exceeded its safety limit or the `u32` range.
    #[error("length overflow: {0}")]
    LengthOverflow(String),

    /// Reading from a stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Application-level decode error.
    #[error("{0}")]
    Custom(String),
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` into a byte buffer.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;
}

/// Deserialize a value from a byte slice.
///
/// Returns `(value, bytes_consumed)` on success so that callers can
/// advance a cursor through a buffer containing multiple encoded items.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

/// A value whose encoding always occupies exactly [`FixedWidth::WIDTH`] bytes.
pub trait FixedWidth {
    /// Encoded size in bytes.
    const WIDTH: usize;
}

// ------------------------------------------------------------------------------------------------
// Convenience functions
// ------------------------------------------------------------------------------------------------

/// Encode a value into a freshly-allocated `Vec<u8>`.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf)?;
    Ok(buf)
}

/// Decode a value from the beginning of `buf`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode_from_slice<T: Decode>(buf: &[u8]) -> Result<(T, usize), EncodingError> {
    T::decode_from(buf)
}

/// Read exactly one fixed-width value from a stream.
pub fn read_fixed<T, R>(reader: &mut R) -> Result<T, EncodingError>
where
    T: Decode + FixedWidth,
    R: Read + ?Sized,
{
    let mut raw = [0u8; 8];
    let slot = raw
        .get_mut(..T::WIDTH)
        .ok_or_else(|| EncodingError::Custom(format!("fixed width {} too large", T::WIDTH)))?;
    reader.read_exact(slot)?;
    let (value, _) = T::decode_from(slot)?;
    Ok(value)
}

/// Encode a counted sequence as `[u32 count][items…]`.
pub fn encode_vec<T: Encode>(items: &[T], buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    len_to_u32(items.len())?.encode_to(buf)?;
    encode_seq(items, buf)
}

/// Decode a counted sequence written by [`encode_vec`].
pub fn decode_vec<T: Decode>(buf: &[u8]) -> Result<(Vec<T>, usize), EncodingError> {
    let (count, offset) = u32::decode_from(buf)?;
    if count > MAX_SEQ_ELEMENTS {
        return Err(EncodingError::LengthOverflow(format!(
            "element count {count} exceeds MAX_SEQ_ELEMENTS ({MAX_SEQ_ELEMENTS})"
        )));
    }
    let (items, consumed) = decode_seq(&buf[offset..], count as usize)?;
    Ok((items, offset + consumed))
}

/// Encode items back to back without a count prefix.
pub fn encode_seq<T: Encode>(items: &[T], buf: &mut Vec<u8>) -> Result<(), EncodingError> {
    for item in items {
        item.encode_to(buf)?;
    }
    Ok(())
}

/// Decode `count` items written back to back.
pub fn decode_seq<T: Decode>(buf: &[u8], count: usize) -> Result<(Vec<T>, usize), EncodingError> {
    let mut items = Vec::with_capacity(count.min(MAX_SEQ_ELEMENTS as usize));
    let mut offset = 0;
    for _ in 0..count {
        let (item, consumed) = T::decode_from(&buf[offset..])?;
        items.push(item);
        offset += consumed;
    }
    Ok((items, offset))
}

/// Convert a `usize` length to `u32`, returning [`EncodingError::LengthOverflow`]
/// if the value exceeds `u32::MAX`.
#[inline]
pub fn len_to_u32(len: usize) -> Result<u32, EncodingError> {
    u32::try_from(len)
        .map_err(|_| EncodingError::LengthOverflow(format!("length {len} exceeds u32::MAX")))
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` has at least `needed` bytes, returning
/// [`EncodingError::UnexpectedEof`] if not.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Primitive implementations
// ------------------------------------------------------------------------------------------------

impl Encode for u8 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.push(*self);
        Ok(())
    }
}

impl Decode for u8 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 1)?;
        Ok((buf[0], 1))
    }
}

impl FixedWidth for u8 {
    const WIDTH: usize = 1;
}

impl Encode for u32 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl Decode for u32 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buf[..4]);
        Ok((u32::from_le_bytes(bytes), 4))
    }
}

impl FixedWidth for u32 {
    const WIDTH: usize = 4;
}

impl Encode for u64 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }
}

impl Decode for u64 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[..8]);
        Ok((u64::from_le_bytes(bytes), 8))
    }
}

impl FixedWidth for u64 {
    const WIDTH: usize = 8;
}
