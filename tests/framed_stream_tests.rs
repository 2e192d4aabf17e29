//! Framed codec round trips and failure modes

use std::io::{self, Read, Write};

use opflow_io::error::frame_error;
use opflow_io::frame::{FrameInfo, FRAME_INFO_LEN, STREAM_HEADER_LEN};
use opflow_io::{CodecKind, FrameConfig, FrameError, FramedReader, FramedWriter, MIN_FRAME_SIZE};

const N: usize = MIN_FRAME_SIZE;

fn codecs() -> Vec<CodecKind> {
    let mut out = vec![CodecKind::Raw, CodecKind::Lz4];
    if cfg!(feature = "zstd") {
        out.push(CodecKind::Zstd);
    }
    out
}

/// Mildly compressible, deterministic bytes.
fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31) % 251) as u8 ^ (i / 97) as u8).collect()
}

fn encode(codec: CodecKind, data: &[u8]) -> Vec<u8> {
    let mut w = FramedWriter::new(Vec::new(), codec, N).expect("writer");
    w.write_all(data).expect("write");
    w.finish().expect("finish")
}

fn decode(codec: CodecKind, bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut r = FramedReader::new(bytes, codec).expect("reader");
    let mut out = Vec::new();
    r.read_to_end(&mut out)?;
    Ok(out)
}

#[test]
fn test_round_trip_lengths() {
    for codec in codecs() {
        for len in [0, 1, N - 1, N, 3 * N + 7] {
            let data = sample(len);
            let bytes = encode(codec, &data);
            let back = decode(codec, &bytes).expect("decode");
            assert_eq!(back, data, "{codec:?} with {len} bytes");
        }
    }
}

#[test]
fn test_round_trip_small_writes() {
    let data = sample(2 * N + 123);
    let mut w = FramedWriter::new(Vec::new(), CodecKind::Lz4, N).unwrap();
    for chunk in data.chunks(17) {
        w.write_all(chunk).unwrap();
    }
    let bytes = w.finish().unwrap();

    // Read back in odd-sized pieces.
    let mut r = FramedReader::new(&bytes[..], CodecKind::Lz4).unwrap();
    let mut back = Vec::new();
    let mut buf = [0u8; 1000];
    loop {
        let n = r.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        back.extend_from_slice(&buf[..n]);
    }
    assert_eq!(back, data);
}

#[test]
fn test_exact_frame_has_no_trailing_frame() {
    let bytes = encode(CodecKind::Raw, &sample(N));
    assert_eq!(bytes.len(), STREAM_HEADER_LEN + FRAME_INFO_LEN + N);
    // Complete frame: incomplete bit clear.
    assert_eq!(bytes[STREAM_HEADER_LEN] & 0x01, 0);
}

#[test]
fn test_truncated_payload_is_unexpected_end() {
    for codec in codecs() {
        let bytes = encode(codec, &sample(N + 500));
        let truncated = &bytes[..bytes.len() - 1];
        let err = decode(codec, truncated).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof, "{codec:?}");
        assert!(matches!(
            frame_error(&err),
            Some(FrameError::UnexpectedEndOfStream(_))
        ));
    }
}

#[test]
fn test_truncated_length_field_is_unexpected_end() {
    let bytes = encode(CodecKind::Raw, b"tail");
    // Header, frame-info, then two of the four length bytes.
    let cut = STREAM_HEADER_LEN + FRAME_INFO_LEN + 2;
    let err = decode(CodecKind::Raw, &bytes[..cut]).unwrap_err();
    assert!(matches!(
        frame_error(&err),
        Some(FrameError::UnexpectedEndOfStream("frame length"))
    ));
}

#[test]
fn test_truncated_frame_info_is_unexpected_end() {
    for codec in codecs() {
        let data = sample(N + 100);
        let bytes = encode(codec, &data);
        // The first frame is complete; its info carries the payload length.
        let first_info: [u8; 4] = bytes[STREAM_HEADER_LEN..STREAM_HEADER_LEN + FRAME_INFO_LEN]
            .try_into()
            .unwrap();
        let first_payload = FrameInfo::decode(first_info).compressed_len;
        let second_info = STREAM_HEADER_LEN + FRAME_INFO_LEN + first_payload;

        for kept in 1..FRAME_INFO_LEN {
            let truncated = &bytes[..second_info + kept];
            let mut r = FramedReader::new(truncated, codec).unwrap();
            let mut first = vec![0u8; N];
            r.read_exact(&mut first).unwrap();
            assert_eq!(&first[..], &data[..N], "{codec:?}");

            let err = r.read(&mut [0u8; 8]).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof, "{codec:?} kept {kept}");
            assert!(matches!(
                frame_error(&err),
                Some(FrameError::UnexpectedEndOfStream("frame info"))
            ));
        }
    }
}

#[test]
fn test_bad_magic_fails_on_first_read() {
    let mut bytes = encode(CodecKind::Lz4, &sample(100));
    bytes[..4].copy_from_slice(b"XXXX");

    let mut r = FramedReader::new(&bytes[..], CodecKind::Lz4).unwrap();
    let err = r.read(&mut [0u8; 16]).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    let frame_err = frame_error(&err).expect("frame error");
    assert!(frame_err.is_format_error());
    assert!(frame_err.to_string().contains("invalid frame header"));
}

#[test]
fn test_empty_input_is_unexpected_end() {
    let err = decode(CodecKind::Raw, &[]).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
}

#[test]
fn test_flush_mid_stream_round_trips() {
    let mut w = FramedWriter::new(Vec::new(), CodecKind::Lz4, N).unwrap();
    w.write_all(b"first batch;").unwrap();
    w.flush().unwrap();
    w.write_all(&sample(N)).unwrap();
    w.write_all(b";last").unwrap();
    let bytes = w.finish().unwrap();

    let mut expected = b"first batch;".to_vec();
    expected.extend_from_slice(&sample(N));
    expected.extend_from_slice(b";last");
    assert_eq!(decode(CodecKind::Lz4, &bytes).unwrap(), expected);
}

#[test]
fn test_frame_config_round_trip() {
    let config = FrameConfig {
        frame_size: 8 * 1024,
        codec: CodecKind::Lz4,
    };
    let mut w = config.writer(Vec::new()).unwrap();
    assert_eq!(w.frame_size(), 8 * 1024);
    w.write_all(b"configured").unwrap();
    let bytes = w.finish().unwrap();

    let mut r = config.reader(&bytes[..]).unwrap();
    let mut s = String::new();
    r.read_to_string(&mut s).unwrap();
    assert_eq!(s, "configured");
    assert_eq!(r.frame_size(), Some(8 * 1024));
}
