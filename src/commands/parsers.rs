//! Per-Command Argument Parsers
//!
//! One pure function per backend command. Each takes the empty operation
//! allocated by the pipeline and the client's argument vector, and either
//! fills in the request or fails with a descriptive error. A parser never
//! leaves a half-filled request behind: the request is only set once every
//! argument has been validated.

use crate::client::{ReadOp, ReadRequest, SetMode, WriteOp, WriteRequest};
use crate::protocol::CommandArgs;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Largest offset SETRANGE accepts (512 MB, the Redis string limit).
pub const MAX_SETRANGE_OFFSET: usize = 512 * 1024 * 1024;

/// Fills a read operation from command arguments.
pub type ReadParser = fn(&mut ReadOp, &CommandArgs) -> Result<(), CommandParseError>;

/// Fills a write operation from command arguments.
pub type WriteParser = fn(&mut WriteOp, &CommandArgs) -> Result<(), CommandParseError>;

/// Malformed arguments for an otherwise known command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("wrong number of arguments for '{0}' command")]
    WrongArgCount(&'static str),

    #[error("value is not an integer or out of range")]
    NotAnInteger,

    #[error("offset is out of range")]
    OffsetOutOfRange,

    #[error("invalid expire time in '{0}' command")]
    InvalidExpireTime(&'static str),

    #[error("syntax error")]
    Syntax,
}

fn expect_args(
    args: &CommandArgs,
    count: usize,
    command: &'static str,
) -> Result<(), CommandParseError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(CommandParseError::WrongArgCount(command))
    }
}

fn parse_i64(arg: &Bytes) -> Result<i64, CommandParseError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandParseError::NotAnInteger)
}

// ============================================================================
// Reads
// ============================================================================

/// GET key
pub fn parse_get(op: &mut ReadOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 2, "get")?;
    op.set_request(ReadRequest::Get {
        key: args[1].clone(),
    });
    Ok(())
}

/// HGET key field
pub fn parse_hget(op: &mut ReadOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 3, "hget")?;
    op.set_request(ReadRequest::HGet {
        key: args[1].clone(),
        field: args[2].clone(),
    });
    Ok(())
}

/// STRLEN key
pub fn parse_strlen(op: &mut ReadOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 2, "strlen")?;
    op.set_request(ReadRequest::StrLen {
        key: args[1].clone(),
    });
    Ok(())
}

/// EXISTS key
pub fn parse_exists(op: &mut ReadOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 2, "exists")?;
    op.set_request(ReadRequest::Exists {
        key: args[1].clone(),
    });
    Ok(())
}

/// GETRANGE key start end
pub fn parse_getrange(op: &mut ReadOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 4, "getrange")?;
    let start = parse_i64(&args[2])?;
    let end = parse_i64(&args[3])?;
    op.set_request(ReadRequest::GetRange {
        key: args[1].clone(),
        start,
        end,
    });
    Ok(())
}

// ============================================================================
// Writes
// ============================================================================

/// SET key value [EX seconds | PX milliseconds] [NX | XX]
pub fn parse_set(op: &mut WriteOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    if args.len() < 3 {
        return Err(CommandParseError::WrongArgCount("set"));
    }

    let mut ttl = None;
    let mut mode = SetMode::Always;

    let mut i = 3;
    while i < args.len() {
        let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match opt.as_str() {
            "EX" | "PX" => {
                if ttl.is_some() {
                    return Err(CommandParseError::Syntax);
                }
                i += 1;
                let raw = args.get(i).ok_or(CommandParseError::Syntax)?;
                let amount = parse_i64(raw)?;
                let millis = if opt == "EX" {
                    amount.checked_mul(1000)
                } else {
                    Some(amount)
                };
                let millis = millis
                    .filter(|ms| *ms > 0)
                    .and_then(|ms| u64::try_from(ms).ok())
                    .ok_or(CommandParseError::InvalidExpireTime("set"))?;
                ttl = Some(Duration::from_millis(millis));
            }
            "NX" | "XX" => {
                if mode != SetMode::Always {
                    return Err(CommandParseError::Syntax);
                }
                mode = if opt == "NX" {
                    SetMode::IfAbsent
                } else {
                    SetMode::IfPresent
                };
            }
            _ => return Err(CommandParseError::Syntax),
        }
        i += 1;
    }

    op.set_request(WriteRequest::Set {
        key: args[1].clone(),
        value: args[2].clone(),
        ttl,
        mode,
    });
    Ok(())
}

/// HSET key field value
pub fn parse_hset(op: &mut WriteOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 4, "hset")?;
    op.set_request(WriteRequest::HSet {
        key: args[1].clone(),
        field: args[2].clone(),
        value: args[3].clone(),
    });
    Ok(())
}

/// GETSET key value
pub fn parse_getset(op: &mut WriteOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 3, "getset")?;
    op.set_request(WriteRequest::GetSet {
        key: args[1].clone(),
        value: args[2].clone(),
    });
    Ok(())
}

/// APPEND key value
pub fn parse_append(op: &mut WriteOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 3, "append")?;
    op.set_request(WriteRequest::Append {
        key: args[1].clone(),
        value: args[2].clone(),
    });
    Ok(())
}

/// DEL key
pub fn parse_del(op: &mut WriteOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 2, "del")?;
    op.set_request(WriteRequest::Del {
        key: args[1].clone(),
    });
    Ok(())
}

/// SETRANGE key offset value
pub fn parse_setrange(op: &mut WriteOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 4, "setrange")?;
    let offset = parse_i64(&args[2])?;
    let offset = usize::try_from(offset).map_err(|_| CommandParseError::OffsetOutOfRange)?;
    if offset.saturating_add(args[3].len()) > MAX_SETRANGE_OFFSET {
        return Err(CommandParseError::OffsetOutOfRange);
    }
    op.set_request(WriteRequest::SetRange {
        key: args[1].clone(),
        offset,
        value: args[3].clone(),
    });
    Ok(())
}

/// INCR key
pub fn parse_incr(op: &mut WriteOp, args: &CommandArgs) -> Result<(), CommandParseError> {
    expect_args(args, 2, "incr")?;
    op.set_request(WriteRequest::Incr {
        key: args[1].clone(),
        delta: 1,
    });
    Ok(())
}
