#![forbid(unsafe_code)]
//! opflow-io: framed streaming compression over byte channels.
//!
//! A stream is a header (`magic`, nominal frame size) followed by frames.
//! Each frame carries one independently compressed chunk of at most the
//! nominal frame size; only a frame shorter than that records its
//! uncompressed length. See `frame` for the exact layout.
//!
//! No async here. `FramedWriter` wraps any `Write`, `FramedReader` any `Read`.

pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod reader;
pub mod writer;

pub use codec::CodecKind;
pub use config::FrameConfig;
pub use error::{FrameError, Result};
pub use frame::{clamp_frame_size, DEFAULT_FRAME_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
pub use reader::FramedReader;
pub use writer::FramedWriter;
