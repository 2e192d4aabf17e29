//! Codec configuration resolved once by the caller.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::codec::CodecKind;
use crate::error::Result;
use crate::frame::{clamp_frame_size, DEFAULT_FRAME_SIZE};
use crate::reader::FramedReader;
use crate::writer::FramedWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Nominal uncompressed frame size; clamped when a writer is built.
    pub frame_size: usize,
    pub codec: CodecKind,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            codec: if cfg!(feature = "lz4") {
                CodecKind::Lz4
            } else {
                CodecKind::Raw
            },
        }
    }
}

impl FrameConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `OPFLOW_FRAME_SIZE`: nominal frame size in bytes
    /// - `OPFLOW_FRAME_CODEC`: `raw`, `lz4`, or `zstd`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("OPFLOW_FRAME_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.frame_size = v;
            }
        }

        if let Ok(s) = std::env::var("OPFLOW_FRAME_CODEC") {
            if let Some(v) = CodecKind::parse(&s) {
                cfg.codec = v;
            }
        }

        cfg
    }

    pub fn effective_frame_size(&self) -> usize {
        clamp_frame_size(self.frame_size)
    }

    pub fn writer<W: Write>(&self, inner: W) -> Result<FramedWriter<W>> {
        FramedWriter::new(inner, self.codec, self.frame_size)
    }

    pub fn reader<R: Read>(&self, inner: R) -> Result<FramedReader<R>> {
        FramedReader::new(inner, self.codec)
    }
}
