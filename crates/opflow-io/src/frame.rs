//! Stream and frame headers.
//!
//! Layout (all integers big-endian):
//! [ magic: 4 bytes ][ nominal frame size: i32 ]
//! then per frame:
//! [ frame-info: u32 ][ uncompressed size: i32, incomplete frames only ][ payload … ]
//!
//! frame-info bits 0..24 hold the payload length; bit 24 marks a frame
//! holding fewer than the nominal number of bytes.

use crate::error::{FrameError, Result};

pub const STREAM_HEADER_LEN: usize = 8;
pub const FRAME_INFO_LEN: usize = 4;
pub const UNCOMPRESSED_LEN_LEN: usize = 4;

pub const MIN_FRAME_SIZE: usize = 4 * 1024;
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
pub const DEFAULT_FRAME_SIZE: usize = 64 * 1024;

/// Largest payload length representable in frame-info.
pub const MAX_COMPRESSED_LEN: usize = 0x00FF_FFFF;
const INCOMPLETE_FLAG: u32 = 1 << 24;

/// Clamp a requested frame size to the supported range.
#[inline]
pub fn clamp_frame_size(size: usize) -> usize {
    size.clamp(MIN_FRAME_SIZE, MAX_FRAME_SIZE)
}

pub fn encode_stream_header(magic: [u8; 4], frame_size: usize) -> [u8; STREAM_HEADER_LEN] {
    let mut out = [0u8; STREAM_HEADER_LEN];
    out[..4].copy_from_slice(&magic);
    // frame_size <= MAX_FRAME_SIZE, so it fits an i32.
    out[4..].copy_from_slice(&(frame_size as i32).to_be_bytes());
    out
}

/// Validate the magic and return the nominal frame size.
pub fn decode_stream_header(bytes: &[u8; STREAM_HEADER_LEN], expected: [u8; 4]) -> Result<usize> {
    let mut found = [0u8; 4];
    found.copy_from_slice(&bytes[..4]);
    if found != expected {
        return Err(FrameError::InvalidMagic { expected, found });
    }
    let mut size = [0u8; 4];
    size.copy_from_slice(&bytes[4..]);
    let size = i32::from_be_bytes(size) as i64;
    if size < MIN_FRAME_SIZE as i64 || size > MAX_FRAME_SIZE as i64 {
        return Err(FrameError::InvalidFrameSize(size));
    }
    Ok(size as usize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub compressed_len: usize,
    pub incomplete: bool,
}

impl FrameInfo {
    /// Panics if `compressed_len` does not fit in 24 bits; the writer sizes
    /// frames so this cannot happen.
    pub fn encode(&self) -> [u8; FRAME_INFO_LEN] {
        assert!(
            self.compressed_len <= MAX_COMPRESSED_LEN,
            "compressed frame of {} bytes exceeds frame-info capacity",
            self.compressed_len
        );
        let mut v = self.compressed_len as u32;
        if self.incomplete {
            v |= INCOMPLETE_FLAG;
        }
        v.to_be_bytes()
    }

    pub fn decode(bytes: [u8; FRAME_INFO_LEN]) -> Self {
        let v = u32::from_be_bytes(bytes);
        Self {
            compressed_len: (v & MAX_COMPRESSED_LEN as u32) as usize,
            incomplete: v & INCOMPLETE_FLAG != 0,
        }
    }
}
