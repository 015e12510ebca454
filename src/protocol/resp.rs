//! RESP2 parser and encoder
//!
//! The parser is incremental: it only consumes bytes from the buffer once a
//! complete value (including every nested array element) is available.

use super::types::{RespError, RespValue};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const CRLF: &[u8] = b"\r\n";

/// Largest bulk string accepted, as in Redis' proto-max-bulk-len default
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Outcome of one parse attempt
#[derive(Debug, PartialEq)]
pub enum Parsed {
    /// A complete value, already consumed from the buffer
    Complete(RespValue),
    /// Nothing consumed; the buffer must hold at least this many bytes
    /// before another attempt can succeed
    Incomplete(usize),
}

/// Result of parsing at an offset
enum Step {
    Done(RespValue, usize),
    Need(usize),
}

/// RESP2 Parser
pub struct RespParser;

impl RespParser {
    /// Parse one RESP value from the front of `buf`
    ///
    /// Returns Ok(Some(value)) and advances the buffer if a complete value was
    /// available, Ok(None) if more data is needed (nothing consumed),
    /// Err(e) if the data is not valid RESP.
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, RespError> {
        match Self::parse_partial(buf)? {
            Parsed::Complete(value) => Ok(Some(value)),
            Parsed::Incomplete(_) => Ok(None),
        }
    }

    /// Like [`RespParser::parse`], but an incomplete value also reports how
    /// many bytes are needed, so a reader can skip attempts that cannot
    /// succeed yet
    pub fn parse_partial(buf: &mut BytesMut) -> Result<Parsed, RespError> {
        match Self::parse_at(&buf[..], 0)? {
            Step::Done(value, end) => {
                buf.advance(end);
                Ok(Parsed::Complete(value))
            }
            Step::Need(needed) => Ok(Parsed::Incomplete(needed)),
        }
    }

    /// Parse a value starting at `pos`
    fn parse_at(buf: &[u8], pos: usize) -> Result<Step, RespError> {
        let (line, next) = match Self::line_at(buf, pos) {
            Some(found) => found,
            None => return Ok(Step::Need(buf.len().max(pos) + 1)),
        };

        if line.is_empty() {
            return Err(RespError::InvalidProtocol("empty line".to_string()));
        }

        let body = &line[1..];
        match line[0] {
            b'+' => Ok(Step::Done(RespValue::SimpleString(Self::utf8(body)?), next)),
            b'-' => Ok(Step::Done(RespValue::Error(Self::utf8(body)?), next)),
            b':' => Ok(Step::Done(RespValue::Integer(Self::integer(body)?), next)),
            b'$' => {
                let len = Self::integer(body)?;
                if len == -1 {
                    return Ok(Step::Done(RespValue::Null, next));
                }
                let len = usize::try_from(len)
                    .ok()
                    .filter(|len| *len <= MAX_BULK_LEN)
                    .ok_or_else(|| {
                        RespError::InvalidProtocol(format!("Invalid bulk string length: {}", len))
                    })?;

                let end = next + len;
                if buf.len() < end + 2 {
                    return Ok(Step::Need(end + 2));
                }
                if &buf[end..end + 2] != CRLF {
                    return Err(RespError::InvalidProtocol(
                        "Missing CRLF after bulk string data".to_string(),
                    ));
                }
                let data = Bytes::copy_from_slice(&buf[next..end]);
                Ok(Step::Done(RespValue::BulkString(data), end + 2))
            }
            b'*' => {
                let count = Self::integer(body)?;
                if count == -1 {
                    return Ok(Step::Done(RespValue::Null, next));
                }
                if count < 0 {
                    return Err(RespError::InvalidProtocol(format!(
                        "Invalid array count: {}",
                        count
                    )));
                }

                // every element takes at least three bytes, so the buffer
                // bounds what a real reply can hold
                let remaining = buf.len().saturating_sub(next) / 3;
                let mut elements = Vec::with_capacity((count as usize).min(remaining));
                let mut cursor = next;
                for _ in 0..count {
                    match Self::parse_at(buf, cursor)? {
                        Step::Done(value, after) => {
                            elements.push(value);
                            cursor = after;
                        }
                        Step::Need(needed) => return Ok(Step::Need(needed)),
                    }
                }
                Ok(Step::Done(RespValue::Array(elements), cursor))
            }
            other => Err(RespError::InvalidProtocol(format!(
                "Unknown type prefix: {}",
                other as char
            ))),
        }
    }

    /// Find the line starting at `pos`, returning it without CRLF and the offset after CRLF
    fn line_at(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
        let rest = buf.get(pos..)?;
        rest.windows(2)
            .position(|w| w == CRLF)
            .map(|i| (&rest[..i], pos + i + 2))
    }

    fn utf8(raw: &[u8]) -> Result<String, RespError> {
        String::from_utf8(raw.to_vec()).map_err(|_| RespError::InvalidUtf8)
    }

    fn integer(raw: &[u8]) -> Result<i64, RespError> {
        std::str::from_utf8(raw)
            .map_err(|_| RespError::InvalidUtf8)?
            .parse::<i64>()
            .map_err(|_| RespError::InvalidInteger)
    }
}

/// RESP2 Encoder
pub struct RespEncoder;

impl RespEncoder {
    /// Encode a RESP value to bytes
    pub fn encode(value: &RespValue) -> Bytes {
        let mut buf = BytesMut::new();
        Self::encode_to(&mut buf, value);
        buf.freeze()
    }

    /// Encode a RESP value into an existing buffer
    pub fn encode_to(buf: &mut BytesMut, value: &RespValue) {
        match value {
            RespValue::SimpleString(s) => {
                buf.put_u8(b'+');
                buf.put_slice(s.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Error(e) => {
                buf.put_u8(b'-');
                buf.put_slice(e.as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::Integer(i) => {
                buf.put_u8(b':');
                buf.put_slice(i.to_string().as_bytes());
                buf.put_slice(CRLF);
            }
            RespValue::BulkString(bytes) => {
                buf.put_u8(b'$');
                buf.put_slice(bytes.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(bytes);
                buf.put_slice(CRLF);
            }
            RespValue::Null => {
                buf.put_slice(b"$-1\r\n");
            }
            RespValue::Array(arr) => {
                buf.put_u8(b'*');
                buf.put_slice(arr.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                for elem in arr {
                    Self::encode_to(buf, elem);
                }
            }
        }
    }

    /// Encode several commands back to back for a pipelined write
    pub fn encode_pipeline(commands: &[RespValue]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64 * commands.len());
        for command in commands {
            Self::encode_to(&mut buf, command);
        }
        buf
    }
}
