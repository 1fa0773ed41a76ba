//! Chunk frame encoding.
//!
//! A chunk frame is a binary message:
//!
//! ```text
//! ┌────────────────────────┬──────────────────────────┐
//! │ index (u32, LE, 4 B)   │ payload (0..chunk_size)  │
//! └────────────────────────┴──────────────────────────┘
//! ```
//!
//! The index is the zero-based position of the payload within the file.
//! Chunk size is a sender decision and is not carried on the wire.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Size of the index prefix in bytes.
pub const INDEX_SIZE: usize = 4;

/// A decoded chunk frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    /// Zero-based chunk position
    pub index: u32,
    /// Chunk payload, possibly empty
    pub payload: Bytes,
}

/// Build a chunk frame from an index and payload.
#[must_use]
pub fn pack(index: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(INDEX_SIZE + payload.len());
    buf.put_u32_le(index);
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a chunk frame into index and payload without copying the payload.
///
/// # Errors
///
/// Returns `Error::FrameTooShort` if the frame is shorter than the index prefix.
pub fn unpack(mut frame: Bytes) -> Result<ChunkFrame> {
    if frame.len() < INDEX_SIZE {
        return Err(Error::FrameTooShort { len: frame.len() });
    }

    let payload = frame.split_off(INDEX_SIZE);
    let mut index = [0u8; INDEX_SIZE];
    index.copy_from_slice(&frame);

    Ok(ChunkFrame {
        index: u32::from_le_bytes(index),
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_layout() {
        let frame = pack(7, b"hi");
        assert_eq!(&frame[..], &[7, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn test_unpack_large_index_is_little_endian() {
        let frame = unpack(Bytes::from_static(&[0x01, 0x02, 0x03, 0x04, 0xff])).unwrap();
        assert_eq!(frame.index, 0x0403_0201);
        assert_eq!(&frame.payload[..], &[0xff]);
    }

    #[test]
    fn test_unpack_empty_payload() {
        let frame = unpack(pack(0, &[])).unwrap();
        assert_eq!(frame.index, 0);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_unpack_preserves_max_index() {
        let frame = unpack(pack(u32::MAX, b"tail")).unwrap();
        assert_eq!(frame.index, u32::MAX);
        assert_eq!(&frame.payload[..], b"tail");
    }

    #[test]
    fn test_unpack_rejects_short_frames() {
        for len in 0..INDEX_SIZE {
            match unpack(Bytes::from(vec![0u8; len])) {
                Err(Error::FrameTooShort { len: got }) => assert_eq!(got, len),
                other => panic!("Expected FrameTooShort, got: {other:?}"),
            }
        }
    }
}
