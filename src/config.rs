//! Server Configuration
//!
//! Command-line flags for the binary and the subset of them the dispatch
//! core consumes.

use clap::Parser;
use std::time::Duration;

/// The default port FlashGate listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host FlashGate binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default master address list of the backend cluster
pub const DEFAULT_MASTER_ADDRESSES: &str = "127.0.0.1:7100";

/// Default timeout for backend reads and writes, in milliseconds
pub const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 60_000;

/// Command-line interface of the FlashGate server.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "flashgate",
    version,
    about = "Redis-compatible command gateway in front of a distributed storage client"
)]
pub struct ServerConfig {
    /// Host to bind to.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Comma separated backend master addresses.
    #[arg(long, default_value = DEFAULT_MASTER_ADDRESSES, value_delimiter = ',')]
    pub master_addresses: Vec<String>,

    /// Timeout applied to every backend read and write.
    #[arg(long, default_value_t = DEFAULT_CLIENT_TIMEOUT_MS)]
    pub client_timeout_ms: u64,

    /// Log filter used when `RUST_LOG` is unset (e.g. `info`, `flashgate=debug`).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The settings the command-dispatch core reads.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            master_addresses: self.master_addresses.clone(),
            client_timeout_ms: self.client_timeout_ms,
        }
    }
}

/// Settings consumed by [`crate::server::RedisService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub master_addresses: Vec<String>,
    pub client_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            master_addresses: vec![DEFAULT_MASTER_ADDRESSES.to_string()],
            client_timeout_ms: DEFAULT_CLIENT_TIMEOUT_MS,
        }
    }
}

impl ServiceConfig {
    /// Session timeout for backend operations.
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }
}
