//! `Content-Length` header framing over a raw byte stream.
//!
//! Each message is `Content-Length: N\r\n` (plus optional extra headers such as
//! `Content-Type`), a blank line, then exactly N bytes of UTF-8 JSON.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const MAX_HEADER_BYTES: usize = 8 * 1024;
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("invalid header line: {0}")]
    InvalidHeader(String),

    #[error("frame of {0} bytes exceeds limit of {1} bytes")]
    FrameTooLarge(usize, usize),

    #[error("frame body is not valid UTF-8")]
    InvalidUtf8,
}

/// Codec yielding one JSON message body per frame
#[derive(Debug, Clone)]
pub struct HeaderCodec {
    max_frame_bytes: usize,
    // Body length parsed from headers, kept until the body fully arrives.
    pending: Option<usize>,
}

impl Default for HeaderCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderCodec {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            pending: None,
        }
    }

    fn parse_headers(&self, headers: &[u8]) -> Result<usize, FramingError> {
        let text = std::str::from_utf8(headers)
            .map_err(|_| FramingError::InvalidHeader("<non-utf8>".to_string()))?;
        let mut length = None;
        for line in text.split("\r\n").filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FramingError::InvalidHeader(line.to_string()))?;
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                let n: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| FramingError::InvalidHeader(line.to_string()))?;
                length = Some(n);
            }
        }
        let length = length.ok_or(FramingError::MissingContentLength)?;
        if length > self.max_frame_bytes {
            return Err(FramingError::FrameTooLarge(length, self.max_frame_bytes));
        }
        Ok(length)
    }
}

impl Decoder for HeaderCodec {
    type Item = String;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, FramingError> {
        let length = match self.pending {
            Some(n) => n,
            None => {
                let end = match find_subsequence(src, HEADER_TERMINATOR) {
                    Some(end) => end,
                    None => {
                        if src.len() > MAX_HEADER_BYTES {
                            return Err(FramingError::InvalidHeader(
                                "header section too large".to_string(),
                            ));
                        }
                        return Ok(None);
                    }
                };
                let n = self.parse_headers(&src[..end])?;
                src.advance(end + HEADER_TERMINATOR.len());
                self.pending = Some(n);
                n
            }
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        self.pending = None;
        let body = src.split_to(length);
        String::from_utf8(body.to_vec())
            .map(Some)
            .map_err(|_| FramingError::InvalidUtf8)
    }
}

impl<T: AsRef<str>> Encoder<T> for HeaderCodec {
    type Error = FramingError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), FramingError> {
        let body = item.as_ref().as_bytes();
        if body.len() > self.max_frame_bytes {
            return Err(FramingError::FrameTooLarge(body.len(), self.max_frame_bytes));
        }
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(body);
        Ok(())
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
