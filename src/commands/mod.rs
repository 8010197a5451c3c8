//! Command Table Module
//!
//! Everything the dispatcher needs to know about a command before it talks
//! to the backend.
//!
//! ## Architecture
//!
//! ```text
//! CommandArgs ("SET", "k", "v")
//!       │
//!       ▼
//! ┌──────────────────┐
//! │ CommandRegistry  │  lower-cased name → CommandEntry
//! │                  │
//! │  - arity         │
//! │  - handler       │  Echo | Read(parser) | Write(parser)
//! │  - histogram     │
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ parse_set(op, …) │  fills the WriteRequest
//! └──────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! ### Reads
//! - `GET`, `HGET`, `STRLEN`, `EXISTS`, `GETRANGE`
//!
//! ### Writes
//! - `SET`, `HSET`, `GETSET`, `APPEND`, `DEL`, `SETRANGE`, `INCR`
//!
//! ### Local
//! - `ECHO`

pub mod metrics;
pub mod parsers;
pub mod registry;

pub use parsers::{CommandParseError, ReadParser, WriteParser};
pub use registry::{
    Arity, ArityError, CommandEntry, CommandInfo, CommandRegistry, Handler, RegistryError,
    EXPECTED_COMMANDS, REDIS_COMMAND_TABLE,
};
