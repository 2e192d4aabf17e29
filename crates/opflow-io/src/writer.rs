//! Framed encoder (compression write path).

use std::io::{self, Write};

use crate::codec::CodecKind;
use crate::config::FrameConfig;
use crate::error::Result;
use crate::frame::{clamp_frame_size, encode_stream_header, FrameInfo, MAX_COMPRESSED_LEN};

/// Segments written bytes into frames of the nominal size and compresses each
/// one independently.
///
/// Bytes are buffered until a frame fills up. `flush` forces the buffered
/// bytes out as an incomplete frame; `finish`/`close` do the same and then
/// hand back or drop the sink. Dropping the writer without finishing it
/// performs a best-effort finish and ignores errors.
pub struct FramedWriter<W: Write> {
    inner: Option<W>,
    codec: CodecKind,
    frame_size: usize,
    buffer: Vec<u8>,
    header_written: bool,
}

impl<W: Write> FramedWriter<W> {
    /// `frame_size` is clamped to `[MIN_FRAME_SIZE, MAX_FRAME_SIZE]`.
    pub fn new(inner: W, codec: CodecKind, frame_size: usize) -> Result<Self> {
        codec.ensure_available()?;
        let frame_size = clamp_frame_size(frame_size);
        assert!(
            codec.max_compressed_len(frame_size) <= MAX_COMPRESSED_LEN,
            "{codec:?} frames of {frame_size} bytes may not fit frame-info"
        );
        Ok(Self {
            inner: Some(inner),
            codec,
            frame_size,
            buffer: Vec::with_capacity(frame_size),
            header_written: false,
        })
    }

    pub fn with_config(inner: W, config: &FrameConfig) -> Result<Self> {
        Self::new(inner, config.codec, config.frame_size)
    }

    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    /// Nominal (clamped) uncompressed frame size.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Bytes waiting in the currently open frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Emit any buffered bytes, flush, and return the sink.
    pub fn finish(mut self) -> io::Result<W> {
        let result = self.finish_in_place();
        // Taken before `?` so the sink is released on the error path too.
        let inner = self.inner.take();
        result?;
        inner.ok_or_else(finished)
    }

    /// Emit any buffered bytes, flush, and drop the sink.
    pub fn close(self) -> io::Result<()> {
        self.finish().map(drop)
    }

    fn finish_in_place(&mut self) -> io::Result<()> {
        self.emit_frame()?;
        self.write_header()?;
        sink(&mut self.inner)?.flush()
    }

    fn write_header(&mut self) -> io::Result<()> {
        if !self.header_written {
            let header = encode_stream_header(self.codec.magic(), self.frame_size);
            sink(&mut self.inner)?.write_all(&header)?;
            self.header_written = true;
        }
        Ok(())
    }

    /// Emit the open frame, if any. A frame shorter than the nominal size is
    /// marked incomplete and carries its uncompressed length.
    fn emit_frame(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let uncompressed_len = self.buffer.len();
        let incomplete = uncompressed_len < self.frame_size;
        let payload = self.codec.compress(&self.buffer)?;
        let info = FrameInfo {
            compressed_len: payload.len(),
            incomplete,
        };

        self.write_header()?;
        let out = sink(&mut self.inner)?;
        out.write_all(&info.encode())?;
        if incomplete {
            // uncompressed_len < frame_size <= MAX_FRAME_SIZE, so it fits an i32.
            out.write_all(&(uncompressed_len as i32).to_be_bytes())?;
        }
        out.write_all(&payload)?;
        self.buffer.clear();

        #[cfg(feature = "tracing")]
        tracing::trace!(
            uncompressed = uncompressed_len,
            compressed = info.compressed_len,
            incomplete,
            "emitted frame"
        );
        Ok(())
    }
}

impl<W: Write> Write for FramedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;
        while consumed < buf.len() {
            let room = self.frame_size - self.buffer.len();
            let take = room.min(buf.len() - consumed);
            self.buffer.extend_from_slice(&buf[consumed..consumed + take]);
            if self.buffer.len() == self.frame_size {
                if let Err(e) = self.emit_frame() {
                    // Bytes from earlier iterations are already framed or buffered.
                    self.buffer.truncate(self.buffer.len() - take);
                    return if consumed > 0 { Ok(consumed) } else { Err(e) };
                }
            }
            consumed += take;
        }
        Ok(consumed)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_frame()?;
        self.write_header()?;
        sink(&mut self.inner)?.flush()
    }
}

impl<W: Write> Drop for FramedWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            let _ = self.finish_in_place();
        }
    }
}

fn sink<W>(inner: &mut Option<W>) -> io::Result<&mut W> {
    inner.as_mut().ok_or_else(finished)
}

fn finished() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "framed writer already finished")
}
