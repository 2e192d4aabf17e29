//! Block compression backends for frames (feature-gated).
//!
//! Keep this tiny and synchronous. The backend is chosen once by the caller
//! and passed to the writer/reader; there is no global selection.

use serde::{Deserialize, Serialize};

use crate::error::{FrameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// Frames stored uncompressed.
    Raw,
    Lz4,
    Zstd,
}

impl CodecKind {
    /// Stream magic identifying the codec family.
    pub const fn magic(self) -> [u8; 4] {
        match self {
            CodecKind::Raw => *b"Rawf",
            CodecKind::Lz4 => *b"Lz4f",
            CodecKind::Zstd => *b"Zstf",
        }
    }

    pub fn from_magic(magic: [u8; 4]) -> Option<Self> {
        [CodecKind::Raw, CodecKind::Lz4, CodecKind::Zstd]
            .into_iter()
            .find(|c| c.magic() == magic)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "none" => Some(CodecKind::Raw),
            "lz4" => Some(CodecKind::Lz4),
            "zstd" => Some(CodecKind::Zstd),
            _ => None,
        }
    }

    /// Fail if the backend was not compiled in.
    pub fn ensure_available(self) -> Result<()> {
        match self {
            CodecKind::Raw => Ok(()),
            CodecKind::Lz4 => {
                if cfg!(feature = "lz4") {
                    Ok(())
                } else {
                    Err(FrameError::CodecUnsupported("lz4"))
                }
            }
            CodecKind::Zstd => {
                if cfg!(feature = "zstd") {
                    Ok(())
                } else {
                    Err(FrameError::CodecUnsupported("zstd"))
                }
            }
        }
    }

    /// Worst-case compressed size of `input_len` bytes.
    pub fn max_compressed_len(self, input_len: usize) -> usize {
        match self {
            CodecKind::Raw => input_len,
            CodecKind::Lz4 => {
                #[cfg(feature = "lz4")]
                {
                    lz4_flex::block::get_maximum_output_size(input_len)
                }
                #[cfg(not(feature = "lz4"))]
                {
                    input_len
                }
            }
            CodecKind::Zstd => {
                #[cfg(feature = "zstd")]
                {
                    zstd::zstd_safe::compress_bound(input_len)
                }
                #[cfg(not(feature = "zstd"))]
                {
                    input_len
                }
            }
        }
    }

    pub fn compress(self, input: &[u8]) -> Result<Vec<u8>> {
        match self {
            CodecKind::Raw => Ok(input.to_vec()),
            CodecKind::Lz4 => {
                #[cfg(feature = "lz4")]
                {
                    Ok(lz4_flex::block::compress(input))
                }
                #[cfg(not(feature = "lz4"))]
                {
                    Err(FrameError::CodecUnsupported("lz4"))
                }
            }
            CodecKind::Zstd => {
                #[cfg(feature = "zstd")]
                {
                    let lvl = 3;
                    zstd::bulk::compress(input, lvl)
                        .map_err(|e| FrameError::Codec(format!("zstd: {e}")))
                }
                #[cfg(not(feature = "zstd"))]
                {
                    Err(FrameError::CodecUnsupported("zstd"))
                }
            }
        }
    }

    /// Decompress one frame payload that must expand to exactly
    /// `uncompressed_len` bytes.
    pub fn decompress(self, input: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let out = match self {
            CodecKind::Raw => input.to_vec(),
            CodecKind::Lz4 => {
                #[cfg(feature = "lz4")]
                {
                    lz4_flex::block::decompress(input, uncompressed_len)
                        .map_err(|e| FrameError::CorruptFrame(format!("lz4: {e}")))?
                }
                #[cfg(not(feature = "lz4"))]
                {
                    return Err(FrameError::CodecUnsupported("lz4"));
                }
            }
            CodecKind::Zstd => {
                #[cfg(feature = "zstd")]
                {
                    zstd::bulk::decompress(input, uncompressed_len)
                        .map_err(|e| FrameError::CorruptFrame(format!("zstd: {e}")))?
                }
                #[cfg(not(feature = "zstd"))]
                {
                    return Err(FrameError::CodecUnsupported("zstd"));
                }
            }
        };
        if out.len() != uncompressed_len {
            return Err(FrameError::CorruptFrame(format!(
                "frame expanded to {} bytes, expected {uncompressed_len}",
                out.len()
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_lookup() {
        for codec in [CodecKind::Raw, CodecKind::Lz4, CodecKind::Zstd] {
            assert_eq!(CodecKind::from_magic(codec.magic()), Some(codec));
            assert_eq!(codec.magic()[3], b'f');
        }
        assert_eq!(CodecKind::from_magic(*b"ESMQ"), None);
    }

    #[test]
    fn test_raw_length_check() {
        let err = CodecKind::Raw.decompress(b"abc", 4).unwrap_err();
        assert!(err.is_format_error());
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_block_roundtrip() {
        let data = b"abcabcabcabcabcabcabcabc".repeat(64);
        let packed = CodecKind::Lz4.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert!(packed.len() <= CodecKind::Lz4.max_compressed_len(data.len()));
        let unpacked = CodecKind::Lz4.decompress(&packed, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[cfg(not(feature = "zstd"))]
    #[test]
    fn test_zstd_without_feature_fails() {
        assert!(matches!(
            CodecKind::Zstd.ensure_available(),
            Err(FrameError::CodecUnsupported("zstd"))
        ));
    }
}
