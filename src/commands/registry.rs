//! Command Registry
//!
//! The static command table and the lookup structure built from it.
//!
//! Each table entry declares a command's Redis-style arity, the handler that
//! services it and its latency histogram. [`CommandRegistry::build`] checks
//! the table against [`EXPECTED_COMMANDS`] once at startup; a missing,
//! duplicated or unknown entry is a [`RegistryError`] and the server refuses
//! to start. After construction the registry is never mutated, so concurrent
//! lookups need no locking.

use crate::commands::metrics::*;
use crate::commands::parsers::{self, ReadParser, WriteParser};
use crate::metrics::{Histogram, HistogramDescriptor, MetricEntity};
use crate::protocol::CommandArgs;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// Every command the table must declare, in table order.
pub const EXPECTED_COMMANDS: [&str; 13] = [
    "get", "hget", "strlen", "exists", "getrange", "set", "hset", "getset", "append", "del",
    "setrange", "incr", "echo",
];

/// Argument-count contract, counting the command name itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    /// Converts a Redis command-table arity: `N` means exactly N arguments,
    /// `-N` means at least N.
    pub const fn from_redis(arity: i32) -> Self {
        if arity < 0 {
            Arity::AtLeast(arity.unsigned_abs() as usize)
        } else {
            Arity::Exactly(arity as usize)
        }
    }

    /// Checks an argument count against the contract.
    pub fn check(&self, argc: usize) -> Result<(), ArityError> {
        match *self {
            Arity::AtLeast(min) if argc < min => Err(ArityError::TooFew),
            Arity::Exactly(n) if argc != n => Err(ArityError::WrongCount),
            _ => Ok(()),
        }
    }
}

/// An argument count that violates a command's [`Arity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArityError {
    #[error("Too few arguments.")]
    TooFew,

    #[error("Wrong number of arguments.")]
    WrongCount,
}

/// How a command is serviced.
#[derive(Debug, Clone, Copy)]
pub enum Handler {
    /// Answered locally, no backend call
    Echo,
    Read(ReadParser),
    Write(WriteParser),
}

/// A command table entry.
#[derive(Debug)]
pub struct CommandInfo {
    /// Lower-case command name
    pub name: &'static str,
    pub arity: Arity,
    pub handler: Handler,
    pub latency: &'static HistogramDescriptor,
}

/// The commands FlashGate serves.
pub static REDIS_COMMAND_TABLE: [CommandInfo; 13] = [
    CommandInfo {
        name: "get",
        arity: Arity::from_redis(-2),
        handler: Handler::Read(parsers::parse_get),
        latency: &HANDLER_LATENCY_GET,
    },
    CommandInfo {
        name: "hget",
        arity: Arity::from_redis(3),
        handler: Handler::Read(parsers::parse_hget),
        latency: &HANDLER_LATENCY_HGET,
    },
    CommandInfo {
        name: "strlen",
        arity: Arity::from_redis(2),
        handler: Handler::Read(parsers::parse_strlen),
        latency: &HANDLER_LATENCY_STRLEN,
    },
    CommandInfo {
        name: "exists",
        arity: Arity::from_redis(2),
        handler: Handler::Read(parsers::parse_exists),
        latency: &HANDLER_LATENCY_EXISTS,
    },
    CommandInfo {
        name: "getrange",
        arity: Arity::from_redis(4),
        handler: Handler::Read(parsers::parse_getrange),
        latency: &HANDLER_LATENCY_GETRANGE,
    },
    CommandInfo {
        name: "set",
        arity: Arity::from_redis(-3),
        handler: Handler::Write(parsers::parse_set),
        latency: &HANDLER_LATENCY_SET,
    },
    CommandInfo {
        name: "hset",
        arity: Arity::from_redis(4),
        handler: Handler::Write(parsers::parse_hset),
        latency: &HANDLER_LATENCY_HSET,
    },
    CommandInfo {
        name: "getset",
        arity: Arity::from_redis(3),
        handler: Handler::Write(parsers::parse_getset),
        latency: &HANDLER_LATENCY_GETSET,
    },
    CommandInfo {
        name: "append",
        arity: Arity::from_redis(3),
        handler: Handler::Write(parsers::parse_append),
        latency: &HANDLER_LATENCY_APPEND,
    },
    CommandInfo {
        name: "del",
        arity: Arity::from_redis(2),
        handler: Handler::Write(parsers::parse_del),
        latency: &HANDLER_LATENCY_DEL,
    },
    CommandInfo {
        name: "setrange",
        arity: Arity::from_redis(4),
        handler: Handler::Write(parsers::parse_setrange),
        latency: &HANDLER_LATENCY_SETRANGE,
    },
    CommandInfo {
        name: "incr",
        arity: Arity::from_redis(2),
        handler: Handler::Write(parsers::parse_incr),
        latency: &HANDLER_LATENCY_INCR,
    },
    CommandInfo {
        name: "echo",
        arity: Arity::from_redis(2),
        handler: Handler::Echo,
        latency: &HANDLER_LATENCY_ECHO,
    },
];

/// The command table does not match the expected command set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("expected {expected} commands in the command table, found {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("command '{0}' must be declared in lower case")]
    NotLowercase(String),

    #[error("command '{0}' is declared but not expected")]
    Unexpected(String),

    #[error("command '{0}' is declared more than once")]
    Duplicate(String),

    #[error("command '{0}' is expected but not declared")]
    Missing(String),
}

/// A resolved command and its latency histogram.
#[derive(Debug)]
pub struct CommandEntry {
    pub info: &'static CommandInfo,
    pub latency: Arc<Histogram>,
}

/// Lower-cased command name to [`CommandEntry`], plus the internal histograms.
#[derive(Debug)]
pub struct CommandRegistry {
    commands: HashMap<&'static str, CommandEntry>,
    error_latency: Arc<Histogram>,
    read_internal_latency: Arc<Histogram>,
    write_internal_latency: Arc<Histogram>,
}

impl CommandRegistry {
    /// Builds the registry from [`REDIS_COMMAND_TABLE`].
    pub fn build(metrics: &MetricEntity) -> Result<Self, RegistryError> {
        Self::from_table(&REDIS_COMMAND_TABLE, &EXPECTED_COMMANDS, metrics)
    }

    fn from_table(
        table: &'static [CommandInfo],
        expected: &[&str],
        metrics: &MetricEntity,
    ) -> Result<Self, RegistryError> {
        if table.len() != expected.len() {
            return Err(RegistryError::CountMismatch {
                expected: expected.len(),
                actual: table.len(),
            });
        }

        let mut commands = HashMap::with_capacity(table.len());
        for info in table {
            if info.name.to_ascii_lowercase() != info.name {
                return Err(RegistryError::NotLowercase(info.name.to_string()));
            }
            if !expected.contains(&info.name) {
                return Err(RegistryError::Unexpected(info.name.to_string()));
            }
            let entry = CommandEntry {
                info,
                latency: metrics.instantiate(info.latency),
            };
            if commands.insert(info.name, entry).is_some() {
                return Err(RegistryError::Duplicate(info.name.to_string()));
            }
        }

        if let Some(missing) = expected.iter().find(|name| !commands.contains_key(*name)) {
            return Err(RegistryError::Missing(missing.to_string()));
        }

        Ok(Self {
            commands,
            error_latency: metrics.instantiate(&HANDLER_LATENCY_ERROR),
            read_internal_latency: metrics.instantiate(&HANDLER_LATENCY_GET_INTERNAL),
            write_internal_latency: metrics.instantiate(&HANDLER_LATENCY_SET_INTERNAL),
        })
    }

    /// Looks up a command by name, ignoring case.
    pub fn resolve(&self, args: &CommandArgs) -> Option<&CommandEntry> {
        let name = args.name_lowercase();
        let entry = self.commands.get(name.as_str());
        if entry.is_none() {
            error!(command = %name, "Command not yet supported");
        }
        entry
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Histogram for calls that fail before reaching the backend.
    pub fn error_latency(&self) -> &Arc<Histogram> {
        &self.error_latency
    }

    /// Histogram for backend read round-trips.
    pub fn read_internal_latency(&self) -> &Arc<Histogram> {
        &self.read_internal_latency
    }

    /// Histogram for backend write round-trips.
    pub fn write_internal_latency(&self) -> &Arc<Histogram> {
        &self.write_internal_latency
    }
}
