//! In-Process Storage Backend
//!
//! A self-contained implementation of the backend interfaces, used by the
//! standalone server, the tests and the benchmarks.
//!
//! ## Components
//!
//! - [`TabletStore`]: sharded string and hash storage with lazy TTL expiry
//! - [`LocalCluster`]: tables, sessions and failure injection on top of it
//!
//! ## Example
//!
//! ```
//! use flashgate::client::{ClientBuilder, TableName};
//! use flashgate::storage::LocalCluster;
//!
//! # tokio_test::block_on(async {
//! let cluster = LocalCluster::with_table(".redis");
//! let client = ClientBuilder::new()
//!     .add_master_server_addr("127.0.0.1:7100")
//!     .build(&cluster)
//!     .await
//!     .unwrap();
//! let table = client.open_table(&TableName::new(".redis")).await.unwrap();
//! assert_eq!(table.name().as_str(), ".redis");
//! # });
//! ```

pub mod cluster;
pub mod engine;

pub use cluster::{LocalClient, LocalCluster, LocalSession, DEFAULT_PENDING_ERROR_CAPACITY};
pub use engine::{Entry, TabletStats, TabletStore, Value};
