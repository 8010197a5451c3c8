//! Client Lifecycle Guard
//!
//! The backend client and the `.redis` table handle are created lazily, on
//! the first command that needs them, and shared by every later command.
//!
//! ```text
//! ensure_initialized()
//!        │
//!        ├── cell set? ──yes──> &ConnectedBackend        (lock-free)
//!        │
//!        └── no ──> get_or_try_init
//!                     │  one caller runs build + open_table,
//!                     │  the others wait on the cell
//!                     ▼
//!                 Ok  → cell set for good
//!                 Err → cell left empty, next command retries
//! ```

use crate::client::{
    BackendError, ClientBuilder, Connector, StorageClient, Table, TableName, DEFAULT_RPC_TIMEOUT,
};
use crate::metrics::MetricEntity;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Name the backend client registers under.
pub const CLIENT_NAME: &str = "redis_client";

/// Table every command reads from and writes to.
pub const REDIS_TABLE_NAME: &str = ".redis";

/// A connected client and its opened table.
pub struct ConnectedBackend {
    pub client: Arc<dyn StorageClient>,
    pub table: Table,
}

impl std::fmt::Debug for ConnectedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedBackend")
            .field("client", &self.client.client_name())
            .field("table", &self.table)
            .finish()
    }
}

/// Once-only initializer for the shared [`ConnectedBackend`].
pub struct ClientGuard {
    connector: Arc<dyn Connector>,
    metrics: Arc<MetricEntity>,
    backend: OnceCell<ConnectedBackend>,
}

impl ClientGuard {
    pub fn new(connector: Arc<dyn Connector>, metrics: Arc<MetricEntity>) -> Self {
        Self {
            connector,
            metrics,
            backend: OnceCell::new(),
        }
    }

    /// Returns the backend, connecting and opening the table on first use.
    pub async fn ensure_initialized(
        &self,
        master_addresses: &[String],
    ) -> Result<&ConnectedBackend, BackendError> {
        if let Some(backend) = self.backend.get() {
            return Ok(backend);
        }

        self.backend
            .get_or_try_init(|| self.connect(master_addresses))
            .await
    }

    /// The backend, if a previous call initialized it.
    pub fn get(&self) -> Option<&ConnectedBackend> {
        self.backend.get()
    }

    async fn connect(&self, master_addresses: &[String]) -> Result<ConnectedBackend, BackendError> {
        let builder = master_addresses.iter().fold(
            ClientBuilder::new()
                .client_name(CLIENT_NAME)
                .default_rpc_timeout(DEFAULT_RPC_TIMEOUT)
                .metric_entity(Arc::clone(&self.metrics)),
            |builder, addr| builder.add_master_server_addr(addr),
        );

        let client = builder.build(self.connector.as_ref()).await.map_err(|e| {
            warn!(masters = ?master_addresses, error = %e, "Could not build backend client");
            e
        })?;

        let name = TableName::new(REDIS_TABLE_NAME);
        let table = client.open_table(&name).await.map_err(|e| {
            warn!(table = %name, error = %e, "Could not open table");
            e
        })?;

        info!(
            client = client.client_name(),
            table = %name,
            table_id = table.id(),
            "Backend client initialized"
        );
        Ok(ConnectedBackend { client, table })
    }
}

impl std::fmt::Debug for ClientGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientGuard")
            .field("initialized", &self.backend.initialized())
            .finish()
    }
}
