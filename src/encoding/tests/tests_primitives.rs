//! Tests for fixed-width primitives: byte layout, truncated input, and
//! stream reads.

use std::io::Cursor;

use crate::encoding::*;

// ------------------------------------------------------------------------------------------------
// Byte layout
// ------------------------------------------------------------------------------------------------

#[test]
fn u32_is_little_endian() {
    let bytes = encode_to_vec(&0xDEAD_BEEFu32).unwrap();
    assert_eq!(bytes, [0xEF, 0xBE, 0xAD, 0xDE]);
    let (decoded, consumed) = decode_from_slice::<u32>(&bytes).unwrap();
    assert_eq!(decoded, 0xDEAD_BEEF);
    assert_eq!(consumed, 4);
}

#[test]
fn u64_is_little_endian() {
    let bytes = encode_to_vec(&0x0102_0304_0506_0708u64).unwrap();
    assert_eq!(bytes, [0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
    let (decoded, consumed) = decode_from_slice::<u64>(&bytes).unwrap();
    assert_eq!(decoded, 0x0102_0304_0506_0708);
    assert_eq!(consumed, 8);
}

#[test]
fn u8_single_byte() {
    let bytes = encode_to_vec(&0xABu8).unwrap();
    assert_eq!(bytes, [0xAB]);
    assert_eq!(decode_from_slice::<u8>(&bytes).unwrap(), (0xAB, 1));
}

// ------------------------------------------------------------------------------------------------
// Truncated input
// ------------------------------------------------------------------------------------------------

#[test]
fn truncated_u32_reports_eof() {
    let err = decode_from_slice::<u32>(&[1, 2, 3]).unwrap_err();
    match err {
        EncodingError::UnexpectedEof { needed, available } => {
            assert_eq!(needed, 4);
            assert_eq!(available, 3);
        }
        other => panic!("expected UnexpectedEof, got {other:?}"),
    }
}

#[test]
fn empty_buffer_u8_reports_eof() {
    assert!(matches!(
        decode_from_slice::<u8>(&[]),
        Err(EncodingError::UnexpectedEof { .. })
    ));
}

// ------------------------------------------------------------------------------------------------
// Stream reads
// ------------------------------------------------------------------------------------------------

#[test]
fn read_fixed_consumes_exact_width() {
    let mut cursor = Cursor::new(vec![7u8, 0x10, 0, 0, 0, 9]);
    assert_eq!(read_fixed::<u8, _>(&mut cursor).unwrap(), 7);
    assert_eq!(read_fixed::<u32, _>(&mut cursor).unwrap(), 0x10);
    assert_eq!(cursor.position(), 5);
}

#[test]
fn read_fixed_short_stream_is_io_error() {
    let mut cursor = Cursor::new(vec![1u8, 2]);
    assert!(matches!(
        read_fixed::<u64, _>(&mut cursor),
        Err(EncodingError::Io(_))
    ));
}
