//! Backend Client, Session and Connector Interfaces
//!
//! These traits are the seam between the command-dispatch core and whatever
//! distributed storage client sits behind it. The core only ever talks to
//! `dyn Connector`, `dyn StorageClient` and `dyn Session`.
//!
//! ```text
//! Connector ──connect()──> StorageClient ──open_table()──> Table
//!                               │                           │
//!                        new_session(ro)              new_read_op()
//!                               ▼                     new_write_op()
//!                            Session
//!              read_async(op) / apply(op) + flush_async()
//!                               │
//!                               ▼
//!                        Completion<T>  (resolved once)
//! ```

use crate::client::{BackendError, ClientBuilder, Completion, ReadOp, Table, TableName, WriteOp};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// When applied operations are sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Every apply is flushed before it returns
    #[default]
    AutoFlushSync,
    /// Operations are sent only on an explicit flush or async read
    ManualFlush,
}

/// A per-operation error buffered by a session after a failed flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpError {
    /// Printed form of the failed operation
    pub operation: String,
    pub error: BackendError,
}

/// Errors drained from a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingErrors {
    pub errors: Vec<OpError>,
    /// More errors occurred than the session could retain
    pub overflowed: bool,
}

/// A backend session grouping operations under one timeout and flush mode.
pub trait Session: Send + Sync {
    fn is_read_only(&self) -> bool;

    /// Timeout applied to every operation submitted on this session.
    fn set_timeout(&self, timeout: Duration);

    fn set_flush_mode(&self, mode: FlushMode) -> Result<(), BackendError>;

    /// Submits a read. The returned completion yields the op with its
    /// response filled in.
    fn read_async(&self, op: ReadOp) -> Completion<ReadOp>;

    /// Queues a write until the next flush.
    fn apply(&self, op: WriteOp) -> Result<(), BackendError>;

    /// Sends every queued write. The completion yields the flushed ops, in
    /// apply order, with their responses filled in.
    fn flush_async(&self) -> Completion<Vec<WriteOp>>;

    /// Drains the per-operation errors buffered by failed flushes.
    fn take_pending_errors(&self) -> PendingErrors;
}

/// A connected storage client.
#[async_trait]
pub trait StorageClient: Send + Sync {
    fn client_name(&self) -> &str;

    async fn open_table(&self, name: &TableName) -> Result<Table, BackendError>;

    fn new_session(&self, read_only: bool) -> Arc<dyn Session>;
}

/// Builds a [`StorageClient`] from a [`ClientBuilder`] configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        builder: &ClientBuilder,
    ) -> Result<Arc<dyn StorageClient>, BackendError>;
}
