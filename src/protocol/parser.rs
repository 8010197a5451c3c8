//! Zero-Copy RESP Command Framing
//!
//! Turns bytes read from a client socket into tokenized argument vectors.
//! Clients send either a multibulk array of bulk strings
//! (`*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`) or an inline command (`GET name\r\n`).
//!
//! ## How Framing Works
//!
//! [`parse_command`] first scans the buffer without copying to find out
//! whether a whole command is present and where each argument lives. Only
//! when the frame is complete does it split the frame off the buffer and
//! freeze it; every argument is then a `Bytes` slice of that one frame, so
//! no argument data is copied.
//!
//! - `Ok(Some(args))` - a complete frame was consumed from the buffer
//! - `Ok(None)` - the frame is incomplete, the buffer is left untouched
//! - `Err(ParseError)` - the client violated the protocol

use crate::protocol::types::{prefix, CRLF};
use bytes::{Bytes, BytesMut};
use std::num::ParseIntError;
use std::ops::Range;
use thiserror::Error;

/// Errors that can occur while framing a command.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Invalid integer in a length line
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Bulk string length is negative
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative (but not -1 for null)
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// A multibulk element was not a bulk string
    #[error("expected '$', got {0:#04x}")]
    UnexpectedType(u8),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for framing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of arguments in one multibulk command
pub const MAX_ARGS: usize = 1024 * 1024;

/// Maximum length of an inline command line
pub const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Where each argument of a complete frame lives, and how long the frame is.
#[derive(Debug)]
struct FrameLayout {
    args: Vec<Range<usize>>,
    consumed: usize,
}

/// Frames one command from the front of `buf`.
///
/// An empty frame (`*0\r\n`, `*-1\r\n` or a blank inline line) is consumed
/// and returned as an empty vector.
pub fn parse_command(buf: &mut BytesMut) -> ParseResult<Option<Vec<Bytes>>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let layout = if buf[0] == prefix::ARRAY {
        scan_multibulk(buf)?
    } else {
        scan_inline(buf)?
    };

    let Some(layout) = layout else {
        return Ok(None);
    };

    let frame = buf.split_to(layout.consumed).freeze();
    Ok(Some(
        layout
            .args
            .into_iter()
            .map(|range| frame.slice(range))
            .collect(),
    ))
}

/// Scans `*<count>\r\n` followed by `count` bulk strings.
fn scan_multibulk(buf: &[u8]) -> ParseResult<Option<FrameLayout>> {
    let Some((count, mut pos)) = read_length_line(buf, 0)? else {
        return Ok(None);
    };

    if count == -1 {
        return Ok(Some(FrameLayout {
            args: Vec::new(),
            consumed: pos,
        }));
    }
    let count = usize::try_from(count).map_err(|_| ParseError::InvalidArrayLength(count))?;
    if count > MAX_ARGS {
        return Err(ParseError::MessageTooLarge {
            size: count,
            max: MAX_ARGS,
        });
    }

    let mut args = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        if pos >= buf.len() {
            return Ok(None);
        }
        if buf[pos] != prefix::BULK_STRING {
            return Err(ParseError::UnexpectedType(buf[pos]));
        }

        let Some((len, data_start)) = read_length_line(buf, pos)? else {
            return Ok(None);
        };
        let len = usize::try_from(len).map_err(|_| ParseError::InvalidBulkLength(len))?;
        if len > MAX_BULK_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: len,
                max: MAX_BULK_SIZE,
            });
        }

        let data_end = data_start + len;
        if buf.len() < data_end + CRLF.len() {
            return Ok(None);
        }
        if &buf[data_end..data_end + CRLF.len()] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        args.push(data_start..data_end);
        pos = data_end + CRLF.len();
    }

    Ok(Some(FrameLayout {
        args,
        consumed: pos,
    }))
}

/// Scans a whitespace separated inline command terminated by CRLF.
fn scan_inline(buf: &[u8]) -> ParseResult<Option<FrameLayout>> {
    let Some(end) = find_crlf(buf) else {
        if buf.len() > MAX_INLINE_SIZE {
            return Err(ParseError::MessageTooLarge {
                size: buf.len(),
                max: MAX_INLINE_SIZE,
            });
        }
        return Ok(None);
    };

    let mut args = Vec::new();
    let mut i = 0;
    while i < end {
        while i < end && buf[i].is_ascii_whitespace() {
            i += 1;
        }
        let start = i;
        while i < end && !buf[i].is_ascii_whitespace() {
            i += 1;
        }
        if start < i {
            args.push(start..i);
        }
    }

    Ok(Some(FrameLayout {
        args,
        consumed: end + CRLF.len(),
    }))
}

/// Reads `<prefix><integer>\r\n` at `start`.
///
/// Returns the integer and the offset just past the CRLF.
fn read_length_line(buf: &[u8], start: usize) -> ParseResult<Option<(i64, usize)>> {
    let body = &buf[start + 1..];
    let Some(end) = find_crlf(body) else {
        return Ok(None);
    };

    let text = std::str::from_utf8(&body[..end])
        .map_err(|e| ParseError::InvalidInteger(e.to_string()))?;
    let n: i64 = text
        .parse()
        .map_err(|e: ParseIntError| ParseError::InvalidInteger(e.to_string()))?;

    Ok(Some((n, start + 1 + end + CRLF.len())))
}

/// Position of the first `\r\n` in `buf`.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(input: &[u8]) -> (ParseResult<Option<Vec<Bytes>>>, BytesMut) {
        let mut buf = BytesMut::from(input);
        let result = parse_command(&mut buf);
        (result, buf)
    }

    fn strs(args: &[Bytes]) -> Vec<&[u8]> {
        args.iter().map(|a| a.as_ref()).collect()
    }

    #[test]
    fn test_parse_multibulk() {
        let (result, rest) = frame(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
        let args = result.unwrap().unwrap();
        assert_eq!(strs(&args), vec![&b"GET"[..], &b"name"[..]]);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_incomplete_leaves_buffer_untouched() {
        for input in [
            &b"*2\r\n$3\r\nGET\r\n$4\r\nna"[..],
            &b"*2\r\n$3\r\nGET\r\n"[..],
            &b"*2\r"[..],
            &b"GET na"[..],
        ] {
            let (result, rest) = frame(input);
            assert_eq!(result, Ok(None));
            assert_eq!(&rest[..], input);
        }
    }

    #[test]
    fn test_pipelined_frames() {
        let mut buf = BytesMut::from(&b"*1\r\n$4\r\nPING\r\n*2\r\n$4\r\nECHO\r\n$2\r\nhi\r\n"[..]);

        let first = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(strs(&first), vec![&b"PING"[..]]);

        let second = parse_command(&mut buf).unwrap().unwrap();
        assert_eq!(strs(&second), vec![&b"ECHO"[..], &b"hi"[..]]);

        assert_eq!(parse_command(&mut buf), Ok(None));
    }

    #[test]
    fn test_binary_safe_arguments() {
        let (result, _) = frame(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\na\r\n\0b\r\n");
        let args = result.unwrap().unwrap();
        assert_eq!(&args[2][..], b"a\r\n\0b");
    }

    #[test]
    fn test_parse_inline() {
        let (result, _) = frame(b"  SET   key  value\r\n");
        let args = result.unwrap().unwrap();
        assert_eq!(strs(&args), vec![&b"SET"[..], &b"key"[..], &b"value"[..]]);
    }

    #[test]
    fn test_empty_frames() {
        assert_eq!(frame(b"*0\r\n").0, Ok(Some(vec![])));
        assert_eq!(frame(b"*-1\r\n").0, Ok(Some(vec![])));
        assert_eq!(frame(b"   \r\n").0, Ok(Some(vec![])));
    }

    #[test]
    fn test_protocol_violations() {
        assert_eq!(
            frame(b"*1\r\n:12\r\n").0,
            Err(ParseError::UnexpectedType(b':'))
        );
        assert_eq!(
            frame(b"*1\r\n$-5\r\n").0,
            Err(ParseError::InvalidBulkLength(-5))
        );
        assert_eq!(
            frame(b"*-3\r\n").0,
            Err(ParseError::InvalidArrayLength(-3))
        );
        assert!(matches!(
            frame(b"*x\r\n").0,
            Err(ParseError::InvalidInteger(_))
        ));
        assert!(matches!(
            frame(b"*1\r\n$3\r\nGETXX").0,
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_inline_too_long() {
        let input = vec![b'a'; MAX_INLINE_SIZE + 1];
        assert!(matches!(
            frame(&input).0,
            Err(ParseError::MessageTooLarge { .. })
        ));
    }
}
