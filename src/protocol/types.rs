//! RESP (Redis Serialization Protocol) Response Values
//!
//! FlashGate only ever *writes* RESP values; requests are framed straight
//! into argument vectors by the parser. Each value starts with a type prefix
//! byte and ends with CRLF:
//!
//! - `+` Simple String: `+OK\r\n`
//! - `-` Error: `-ERR Unsupported call. : foo\r\n`
//! - `:` Integer: `:1000\r\n`
//! - `$` Bulk String: `$5\r\nhello\r\n` (null: `$-1\r\n`)

use bytes::{BufMut, Bytes, BytesMut};

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A RESP value sent back to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Non-binary-safe status line, e.g. `OK`
    SimpleString(String),
    /// Error line; the text must not contain CRLF
    Error(String),
    Integer(i64),
    /// Binary-safe payload
    BulkString(Bytes),
    /// Null bulk string
    Null,
}

impl RespValue {
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates an error value. CR and LF are replaced with spaces so the
    /// message always fits on one line.
    pub fn error(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.contains(['\r', '\n']) {
            RespValue::Error(s.replace(['\r', '\n'], " "))
        } else {
            RespValue::Error(s)
        }
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn null() -> Self {
        RespValue::Null
    }

    /// `+OK`
    pub fn ok() -> Self {
        Self::simple_string("OK")
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Serializes into a fresh buffer.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len_hint());
        self.write_to(&mut buf);
        buf.freeze()
    }

    /// Appends the wire form of this value to `buf`.
    pub fn write_to(&self, buf: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => write_line(buf, prefix::SIMPLE_STRING, s.as_bytes()),
            RespValue::Error(s) => write_line(buf, prefix::ERROR, s.as_bytes()),
            RespValue::Integer(n) => write_line(buf, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                write_line(buf, prefix::BULK_STRING, data.len().to_string().as_bytes());
                buf.put_slice(data);
                buf.put_slice(CRLF);
            }
            RespValue::Null => write_line(buf, prefix::BULK_STRING, b"-1"),
        }
    }

    fn encoded_len_hint(&self) -> usize {
        match self {
            RespValue::BulkString(data) => data.len() + 16,
            _ => 32,
        }
    }
}

fn write_line(buf: &mut BytesMut, type_prefix: u8, body: &[u8]) {
    buf.reserve(body.len() + 3);
    buf.put_u8(type_prefix);
    buf.put_slice(body);
    buf.put_slice(CRLF);
}
