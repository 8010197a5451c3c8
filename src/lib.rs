//! # FlashGate - A Redis-Compatible Command Gateway
//!
//! FlashGate speaks the Redis protocol to clients and serves a small command
//! set by translating each command into a read or write operation on a
//! distributed storage client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              FlashGate                                  │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐     │
//! │  │ TCP Server  │───>│ Connection  │───>│       RedisService       │     │
//! │  │ (Listener)  │    │  Handler    │    │ registry, guard,         │     │
//! │  └─────────────┘    └─────────────┘    │ read/write pipelines     │     │
//! │                                        └────────────┬─────────────┘     │
//! │                                                     │                   │
//! │                                       Connector / StorageClient /       │
//! │                                       Session (client module)           │
//! │                                                     │                   │
//! │                                                     ▼                   │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │  backend (LocalCluster in standalone mode)   │    │
//! │                     └──────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use flashgate::config::ServiceConfig;
//! use flashgate::metrics::MetricEntity;
//! use flashgate::protocol::{CommandArgs, RespValue};
//! use flashgate::server::{InboundCall, RedisService, REDIS_TABLE_NAME};
//! use flashgate::storage::LocalCluster;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let cluster = LocalCluster::with_table(REDIS_TABLE_NAME);
//! let service = RedisService::new(
//!     ServiceConfig::default(),
//!     Arc::new(cluster),
//!     Arc::new(MetricEntity::default()),
//! )
//! .unwrap();
//!
//! let (call, reply) = InboundCall::new(CommandArgs::from_strs(&["ECHO", "hi"]).unwrap());
//! service.handle(call).await;
//! assert_eq!(reply.await.unwrap(), RespValue::bulk_string("hi"));
//! # });
//! ```
//!
//! ## Supported Commands
//!
//! - Reads: `GET`, `HGET`, `STRLEN`, `EXISTS`, `GETRANGE`
//! - Writes: `SET key value [EX s|PX ms] [NX|XX]`, `HSET`, `GETSET`, `APPEND`,
//!   `DEL`, `SETRANGE`, `INCR`
//! - Local: `ECHO`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP framing and response values
//! - [`commands`]: command table, arity contracts and argument parsers
//! - [`server`]: dispatcher, client lifecycle guard and pipelines
//! - [`client`]: backend client, session and operation interfaces
//! - [`storage`]: in-process backend
//! - [`metrics`]: latency histograms
//! - [`connection`]: client connection management
//! - [`config`]: command-line configuration

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod storage;

pub use config::{ServerConfig, ServiceConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{CommandArgs, ParseError, RespValue};
pub use server::{InboundCall, RedisService};

/// Version of FlashGate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
