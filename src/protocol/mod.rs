//! RESP Protocol Implementation
//!
//! The wire side of FlashGate: framing client bytes into [`CommandArgs`] and
//! serializing [`RespValue`] responses.
//!
//! ## Modules
//!
//! - `parser`: zero-copy framing of multibulk and inline commands
//! - `command`: the non-empty argument vector handed to the dispatcher
//! - `types`: response values and their serialization
//!
//! ## Example
//!
//! ```
//! use bytes::BytesMut;
//! use flashgate::protocol::{parse_command, CommandArgs, RespValue};
//!
//! let mut buf = BytesMut::from(&b"*2\r\n$4\r\nECHO\r\n$5\r\nhello\r\n"[..]);
//! let args = CommandArgs::new(parse_command(&mut buf).unwrap().unwrap()).unwrap();
//! assert_eq!(args.name_lowercase(), "echo");
//!
//! let response = RespValue::bulk_string(args[1].clone());
//! assert_eq!(&response.serialize()[..], b"$5\r\nhello\r\n");
//! ```

pub mod command;
pub mod parser;
pub mod types;

pub use command::CommandArgs;
pub use parser::{parse_command, ParseError, ParseResult};
pub use types::RespValue;
