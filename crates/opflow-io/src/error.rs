use std::io;

use thiserror::Error;

/// Result type local to opflow-io.
pub type Result<T> = std::result::Result<T, FrameError>;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame header: expected magic {expected:?}, found {found:?}")]
    InvalidMagic { expected: [u8; 4], found: [u8; 4] },

    #[error("invalid frame header: nominal frame size {0} out of range")]
    InvalidFrameSize(i64),

    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    #[error("unexpected end of stream while reading {0}")]
    UnexpectedEndOfStream(&'static str),

    #[error("unsupported codec: {0}")]
    CodecUnsupported(&'static str),

    #[error("codec error: {0}")]
    Codec(String),
}

impl FrameError {
    /// Format errors: the bytes are not a well-formed stream of this codec.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidMagic { .. }
                | FrameError::InvalidFrameSize(_)
                | FrameError::CorruptFrame(_)
        )
    }

    fn kind(&self) -> io::ErrorKind {
        match self {
            FrameError::UnexpectedEndOfStream(_) => io::ErrorKind::UnexpectedEof,
            FrameError::CodecUnsupported(_) => io::ErrorKind::Unsupported,
            FrameError::Codec(_) => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        }
    }
}

impl From<FrameError> for io::Error {
    fn from(e: FrameError) -> Self {
        io::Error::new(e.kind(), e)
    }
}

/// Recover the `FrameError` carried by an `io::Error`, if any.
pub fn frame_error(e: &io::Error) -> Option<&FrameError> {
    e.get_ref().and_then(|inner| inner.downcast_ref::<FrameError>())
}
