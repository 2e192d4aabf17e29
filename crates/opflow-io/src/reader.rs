//! Framed decoder (decompression read path).

use std::io::{self, BufRead, Read};

use crate::codec::CodecKind;
use crate::config::FrameConfig;
use crate::error::{FrameError, Result};
use crate::frame::{
    decode_stream_header, FrameInfo, FRAME_INFO_LEN, STREAM_HEADER_LEN, UNCOMPRESSED_LEN_LEN,
};

/// Reads a framed stream written by `FramedWriter` with the same codec.
///
/// The stream header is consumed lazily on the first read. Frames are
/// decompressed one at a time into an internal buffer.
pub struct FramedReader<R: Read> {
    inner: R,
    codec: CodecKind,
    /// Nominal frame size, known once the header has been read.
    frame_size: Option<usize>,
    buffer: Vec<u8>,
    pos: usize,
    eof: bool,
    /// Kind of the first decode error; the stream position is lost after it.
    failed: Option<io::ErrorKind>,
}

impl<R: Read> FramedReader<R> {
    pub fn new(inner: R, codec: CodecKind) -> Result<Self> {
        codec.ensure_available()?;
        Ok(Self {
            inner,
            codec,
            frame_size: None,
            buffer: Vec::new(),
            pos: 0,
            eof: false,
            failed: None,
        })
    }

    pub fn with_config(inner: R, config: &FrameConfig) -> Result<Self> {
        Self::new(inner, config.codec)
    }

    pub fn codec(&self) -> CodecKind {
        self.codec
    }

    /// `None` until the stream header has been read.
    pub fn frame_size(&self) -> Option<usize> {
        self.frame_size
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn ensure_header(&mut self) -> io::Result<usize> {
        if let Some(size) = self.frame_size {
            return Ok(size);
        }
        let mut header = [0u8; STREAM_HEADER_LEN];
        if read_fully(&mut self.inner, &mut header)? < STREAM_HEADER_LEN {
            return Err(FrameError::UnexpectedEndOfStream("stream header").into());
        }
        let size = decode_stream_header(&header, self.codec.magic())?;
        self.frame_size = Some(size);
        Ok(size)
    }

    /// Decode the next frame into the buffer. Returns `false` at a clean end
    /// of stream.
    fn next_frame(&mut self) -> io::Result<bool> {
        let frame_size = self.ensure_header()?;

        let mut info = [0u8; FRAME_INFO_LEN];
        match read_fully(&mut self.inner, &mut info)? {
            0 => {
                self.eof = true;
                return Ok(false);
            }
            FRAME_INFO_LEN => {}
            _ => return Err(FrameError::UnexpectedEndOfStream("frame info").into()),
        }
        let info = FrameInfo::decode(info);

        let uncompressed_len = if info.incomplete {
            let mut len = [0u8; UNCOMPRESSED_LEN_LEN];
            if read_fully(&mut self.inner, &mut len)? < UNCOMPRESSED_LEN_LEN {
                return Err(FrameError::UnexpectedEndOfStream("frame length").into());
            }
            let len = i32::from_be_bytes(len);
            if len < 0 || len as usize > frame_size {
                return Err(FrameError::CorruptFrame(format!(
                    "incomplete frame declares {len} bytes, nominal size is {frame_size}"
                ))
                .into());
            }
            len as usize
        } else {
            frame_size
        };

        if info.compressed_len > self.codec.max_compressed_len(uncompressed_len) {
            return Err(FrameError::CorruptFrame(format!(
                "payload of {} bytes is too large for a {uncompressed_len}-byte frame",
                info.compressed_len
            ))
            .into());
        }

        let mut payload = vec![0u8; info.compressed_len];
        if read_fully(&mut self.inner, &mut payload)? < payload.len() {
            return Err(FrameError::UnexpectedEndOfStream("frame payload").into());
        }
        self.buffer = self.codec.decompress(&payload, uncompressed_len)?;
        self.pos = 0;

        #[cfg(feature = "tracing")]
        tracing::trace!(
            uncompressed = uncompressed_len,
            compressed = info.compressed_len,
            incomplete = info.incomplete,
            "decoded frame"
        );
        Ok(true)
    }
}

impl<R: Read> Read for FramedReader<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(dst.len());
        dst[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for FramedReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if let Some(kind) = self.failed {
            return Err(io::Error::new(
                kind,
                "framed stream is unusable after an earlier error",
            ));
        }
        while self.pos >= self.buffer.len() && !self.eof {
            match self.next_frame() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.failed = Some(e.kind());
                    self.buffer.clear();
                    self.pos = 0;
                    return Err(e);
                }
            }
        }
        Ok(&self.buffer[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.buffer.len());
    }
}

/// Read until `buf` is full or the source ends; returns the bytes read.
fn read_fully<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
