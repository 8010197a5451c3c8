//! Command Dispatch Core
//!
//! Turns tokenized commands into backend operations and backend results
//! into responses.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RedisService                           │
//! │                                                             │
//! │  InboundCall ──> CommandRegistry ──> ClientGuard (once)     │
//! │                        │                                    │
//! │          ┌─────────────┼──────────────┐                     │
//! │          ▼             ▼              ▼                     │
//! │        Echo      execute_read    execute_write              │
//! │          │             │              │                     │
//! │          │        read_async     apply + flush_async        │
//! │          │             │              │                     │
//! │          │             ▼              ▼                     │
//! │          │      PendingRead     PendingWrite  (spawned)     │
//! │          │             │              │                     │
//! │          └─────────────┴──────┬───────┘                     │
//! │                               ▼                             │
//! │                     respond_success / failure               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `call`: the per-command response handle
//! - `guard`: lazy one-time backend client initialization
//! - `dispatcher`: name resolution, arity checks and handler selection
//! - `pipeline`: read and write submission and completion
//! - `response`: uniform responses and latency recording

pub mod call;
pub mod dispatcher;
pub mod guard;
pub mod pipeline;
pub mod response;

pub use call::InboundCall;
pub use dispatcher::RedisService;
pub use guard::{ClientGuard, ConnectedBackend, CLIENT_NAME, REDIS_TABLE_NAME};
