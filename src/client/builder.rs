//! Storage Client Builder

use crate::client::{BackendError, Connector, StorageClient};
use crate::metrics::MetricEntity;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for RPCs the client issues on its own behalf.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for building a storage client.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    client_name: String,
    default_rpc_timeout: Duration,
    master_addresses: Vec<String>,
    metric_entity: Option<Arc<MetricEntity>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client_name: "client".to_string(),
            default_rpc_timeout: DEFAULT_RPC_TIMEOUT,
            master_addresses: Vec::new(),
            metric_entity: None,
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    pub fn default_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.default_rpc_timeout = timeout;
        self
    }

    /// Adds master addresses. Accepts a single address or a comma separated
    /// list; blank entries are skipped.
    pub fn add_master_server_addr(mut self, addrs: &str) -> Self {
        self.master_addresses.extend(
            addrs
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
        );
        self
    }

    pub fn metric_entity(mut self, entity: Arc<MetricEntity>) -> Self {
        self.metric_entity = Some(entity);
        self
    }

    pub fn get_client_name(&self) -> &str {
        &self.client_name
    }

    pub fn get_default_rpc_timeout(&self) -> Duration {
        self.default_rpc_timeout
    }

    pub fn master_addresses(&self) -> &[String] {
        &self.master_addresses
    }

    pub fn get_metric_entity(&self) -> Option<&Arc<MetricEntity>> {
        self.metric_entity.as_ref()
    }

    /// Validates the configuration and connects through `connector`.
    pub async fn build(
        &self,
        connector: &dyn Connector,
    ) -> Result<Arc<dyn StorageClient>, BackendError> {
        if self.master_addresses.is_empty() {
            return Err(BackendError::InvalidArgument(
                "no master server addresses given".to_string(),
            ));
        }
        connector.connect(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_address_list() {
        let builder = ClientBuilder::new()
            .client_name("redis_client")
            .add_master_server_addr("10.0.0.1:7100, 10.0.0.2:7100,,")
            .add_master_server_addr("10.0.0.3:7100");

        assert_eq!(builder.get_client_name(), "redis_client");
        assert_eq!(builder.get_default_rpc_timeout(), DEFAULT_RPC_TIMEOUT);
        assert_eq!(
            builder.master_addresses(),
            &["10.0.0.1:7100", "10.0.0.2:7100", "10.0.0.3:7100"]
        );
        assert!(builder.get_metric_entity().is_none());
    }
}
