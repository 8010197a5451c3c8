//! In-Process Cluster Backend
//!
//! [`LocalCluster`] implements the storage client interfaces of
//! [`crate::client`] on top of [`TabletStore`]s living in this process. It
//! backs the standalone server, the tests and the benchmarks.
//!
//! Besides serving data it can simulate the failure modes a remote cluster
//! shows to its clients:
//!
//! - unreachable masters (`set_reachable(false)`)
//! - a missing table (`drop_table`)
//! - slow RPCs (`set_latency`), which trip session timeouts
//! - failing flushes (`fail_flushes_with`), which fill the session's
//!   pending-error buffer
//!
//! ```text
//! LocalCluster ──connect()──> LocalClient ──new_session()──> LocalSession
//!      │                                                        │
//!      └──────────── tables: name → Arc<TabletStore> ◄──────────┘
//! ```

use crate::client::{
    completion, BackendError, ClientBuilder, Completion, Connector, FlushMode, OpError, Operation,
    OperationRequest, PendingErrors, ReadOp, Session, StorageClient, Table, TableName, WriteOp,
};
use crate::metrics::{Histogram, HistogramDescriptor};
use crate::storage::TabletStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Per-session pending-error buffer size.
pub const DEFAULT_PENDING_ERROR_CAPACITY: usize = 64;

/// Timeout a fresh session uses until the caller sets one.
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Read and flush RPCs issued through a [`LocalClient`], timeouts included.
pub static LOCAL_CLIENT_RPC_LATENCY: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "local_client_rpc_latency",
    "local cluster RPC time",
    "Microseconds spent in read and flush RPCs against the local cluster",
);

#[derive(Debug)]
struct ClusterState {
    tables: RwLock<HashMap<TableName, (String, Arc<TabletStore>)>>,
    reachable: AtomicBool,
    latency_us: AtomicU64,
    flush_failure: Mutex<Option<BackendError>>,
    pending_error_capacity: AtomicUsize,
    connect_attempts: AtomicUsize,
    next_table_id: AtomicU64,
}

impl ClusterState {
    fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us.load(Ordering::Relaxed))
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.reachable.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BackendError::NetworkError(
                "no tablet server reachable".to_string(),
            ))
        }
    }

    fn store(&self, name: &TableName) -> Result<Arc<TabletStore>, BackendError> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|(_, store)| Arc::clone(store))
            .ok_or_else(|| BackendError::NotFound(format!("table {name} does not exist")))
    }

    fn flush_failure(&self) -> Option<BackendError> {
        self.flush_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Simulated RPC latency, then a reachability check.
    async fn round_trip(&self) -> Result<(), BackendError> {
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.check_reachable()
    }

    async fn serve_read(&self, mut op: ReadOp) -> Result<ReadOp, BackendError> {
        self.round_trip().await?;
        let store = self.store(op.table())?;
        let response = match op.request() {
            Some(request) => store.read(request),
            None => return Err(unset_request(&op)),
        };
        op.set_response(response);
        Ok(op)
    }

    async fn serve_flush(&self, mut ops: Vec<WriteOp>) -> Result<Vec<WriteOp>, BackendError> {
        self.round_trip().await?;
        if let Some(failure) = self.flush_failure() {
            return Err(failure);
        }
        for op in &mut ops {
            self.apply_now(op)?;
        }
        Ok(ops)
    }

    fn apply_now(&self, op: &mut WriteOp) -> Result<(), BackendError> {
        let store = self.store(op.table())?;
        let response = match op.request() {
            Some(request) => store.write(request),
            None => return Err(unset_request(op)),
        };
        op.set_response(response);
        Ok(())
    }
}

fn unset_request<R: OperationRequest>(op: &Operation<R>) -> BackendError {
    BackendError::InvalidArgument(format!("{op} has no request"))
}

/// A simulated cluster, cheap to clone.
#[derive(Debug, Clone)]
pub struct LocalCluster {
    state: Arc<ClusterState>,
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCluster {
    /// A reachable cluster with no tables.
    pub fn new() -> Self {
        Self {
            state: Arc::new(ClusterState {
                tables: RwLock::new(HashMap::new()),
                reachable: AtomicBool::new(true),
                latency_us: AtomicU64::new(0),
                flush_failure: Mutex::new(None),
                pending_error_capacity: AtomicUsize::new(DEFAULT_PENDING_ERROR_CAPACITY),
                connect_attempts: AtomicUsize::new(0),
                next_table_id: AtomicU64::new(1),
            }),
        }
    }

    /// A reachable cluster that already has table `name`.
    pub fn with_table(name: &str) -> Self {
        let cluster = Self::new();
        cluster.create_table(&TableName::new(name));
        cluster
    }

    /// Creates `name` if it does not exist yet.
    pub fn create_table(&self, name: &TableName) {
        let mut tables = self
            .state
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        tables.entry(name.clone()).or_insert_with(|| {
            let id = self.state.next_table_id.fetch_add(1, Ordering::Relaxed);
            info!(table = %name, id, "Created table");
            (format!("{id:032x}"), Arc::new(TabletStore::new()))
        });
    }

    /// Removes `name`; later operations on it fail with `NotFound`.
    pub fn drop_table(&self, name: &TableName) -> bool {
        self.state
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// The store behind `name`, for inspection.
    pub fn table_store(&self, name: &TableName) -> Option<Arc<TabletStore>> {
        self.state.store(name).ok()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.reachable.store(reachable, Ordering::Release);
    }

    /// Delay added to every read and flush RPC.
    pub fn set_latency(&self, latency: Duration) {
        self.state
            .latency_us
            .store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    /// Makes every flush fail with `failure`, or restores normal flushes.
    pub fn fail_flushes_with(&self, failure: Option<BackendError>) {
        *self
            .state
            .flush_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = failure;
    }

    /// Pending errors a session retains before reporting overflow.
    pub fn set_pending_error_capacity(&self, capacity: usize) {
        self.state
            .pending_error_capacity
            .store(capacity, Ordering::Relaxed);
    }

    /// Number of `connect` calls received so far.
    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for LocalCluster {
    async fn connect(
        &self,
        builder: &ClientBuilder,
    ) -> Result<Arc<dyn StorageClient>, BackendError> {
        self.state.connect_attempts.fetch_add(1, Ordering::AcqRel);
        self.state.round_trip().await.map_err(|_| {
            BackendError::NetworkError(format!(
                "could not connect to masters {}",
                builder.master_addresses().join(",")
            ))
        })?;

        debug!(
            client = builder.get_client_name(),
            masters = ?builder.master_addresses(),
            "Connected to local cluster"
        );
        Ok(Arc::new(LocalClient {
            name: builder.get_client_name().to_string(),
            rpc_timeout: builder.get_default_rpc_timeout(),
            rpc_latency: builder
                .get_metric_entity()
                .map(|metrics| metrics.instantiate(&LOCAL_CLIENT_RPC_LATENCY)),
            state: Arc::clone(&self.state),
        }))
    }
}

/// A client connected to a [`LocalCluster`].
#[derive(Debug)]
pub struct LocalClient {
    name: String,
    rpc_timeout: Duration,
    /// Set when the builder carried a metric entity
    rpc_latency: Option<Arc<Histogram>>,
    state: Arc<ClusterState>,
}

#[async_trait]
impl StorageClient for LocalClient {
    fn client_name(&self) -> &str {
        &self.name
    }

    async fn open_table(&self, name: &TableName) -> Result<Table, BackendError> {
        tokio::time::timeout(self.rpc_timeout, self.state.round_trip())
            .await
            .map_err(|_| {
                BackendError::TimedOut(format!(
                    "open_table({name}) timed out after {} ms",
                    self.rpc_timeout.as_millis()
                ))
            })??;

        let tables = self
            .state
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let (id, _) = tables
            .get(name)
            .ok_or_else(|| BackendError::NotFound(format!("table {name} does not exist")))?;
        Ok(Table::new(name.clone(), id.clone()))
    }

    fn new_session(&self, read_only: bool) -> Arc<dyn Session> {
        Arc::new(LocalSession {
            state: Arc::clone(&self.state),
            rpc_latency: self.rpc_latency.clone(),
            read_only,
            inner: Arc::new(Mutex::new(SessionInner {
                timeout: DEFAULT_SESSION_TIMEOUT,
                flush_mode: FlushMode::default(),
                buffered: Vec::new(),
                pending: PendingErrors::default(),
            })),
        })
    }
}

#[derive(Debug)]
struct SessionInner {
    timeout: Duration,
    flush_mode: FlushMode,
    buffered: Vec<WriteOp>,
    pending: PendingErrors,
}

impl SessionInner {
    fn record_failures(&mut self, operations: Vec<String>, error: &BackendError, capacity: usize) {
        for operation in operations {
            if self.pending.errors.len() >= capacity {
                self.pending.overflowed = true;
                continue;
            }
            self.pending.errors.push(OpError {
                operation,
                error: error.clone(),
            });
        }
    }
}

/// A session on a [`LocalCluster`].
#[derive(Debug)]
pub struct LocalSession {
    state: Arc<ClusterState>,
    rpc_latency: Option<Arc<Histogram>>,
    read_only: bool,
    inner: Arc<Mutex<SessionInner>>,
}

impl LocalSession {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Session for LocalSession {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn set_timeout(&self, timeout: Duration) {
        self.lock().timeout = timeout;
    }

    fn set_flush_mode(&self, mode: FlushMode) -> Result<(), BackendError> {
        let mut inner = self.lock();
        if !inner.buffered.is_empty() {
            return Err(BackendError::IllegalState(
                "cannot change flush mode with buffered operations".to_string(),
            ));
        }
        inner.flush_mode = mode;
        Ok(())
    }

    fn read_async(&self, op: ReadOp) -> Completion<ReadOp> {
        if op.request().is_none() {
            return Completion::ready(Err(unset_request(&op)));
        }

        let timeout = self.lock().timeout;
        let label = op.to_string();
        let state = Arc::clone(&self.state);
        let rpc_latency = self.rpc_latency.clone();
        let (completer, completion) = completion();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, state.serve_read(op))
                .await
                .unwrap_or_else(|_| {
                    Err(BackendError::TimedOut(format!(
                        "{label} timed out after {} ms",
                        timeout.as_millis()
                    )))
                });
            if let Some(histogram) = rpc_latency {
                histogram.increment_since(started);
            }
            completer.complete(result);
        });

        completion
    }

    fn apply(&self, mut op: WriteOp) -> Result<(), BackendError> {
        if self.read_only {
            return Err(BackendError::IllegalState(
                "cannot apply a write on a read-only session".to_string(),
            ));
        }
        if op.request().is_none() {
            return Err(unset_request(&op));
        }

        let mut inner = self.lock();
        match inner.flush_mode {
            FlushMode::ManualFlush => {
                inner.buffered.push(op);
                Ok(())
            }
            FlushMode::AutoFlushSync => {
                self.state.check_reachable()?;
                self.state.apply_now(&mut op)
            }
        }
    }

    fn flush_async(&self) -> Completion<Vec<WriteOp>> {
        let (ops, timeout) = {
            let mut inner = self.lock();
            (std::mem::take(&mut inner.buffered), inner.timeout)
        };
        if ops.is_empty() {
            return Completion::ready(Ok(ops));
        }

        let labels: Vec<String> = ops.iter().map(ToString::to_string).collect();
        let state = Arc::clone(&self.state);
        let inner = Arc::clone(&self.inner);
        let rpc_latency = self.rpc_latency.clone();
        let (completer, completion) = completion();

        tokio::spawn(async move {
            let started = Instant::now();
            let count = labels.len();
            let result = tokio::time::timeout(timeout, state.serve_flush(ops))
                .await
                .unwrap_or_else(|_| {
                    Err(BackendError::TimedOut(format!(
                        "flush of {count} operations timed out after {} ms",
                        timeout.as_millis()
                    )))
                });
            if let Some(histogram) = rpc_latency {
                histogram.increment_since(started);
            }

            // Failures must be visible to take_pending_errors before the
            // waiter wakes up.
            if let Err(error) = &result {
                let capacity = state.pending_error_capacity.load(Ordering::Relaxed);
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record_failures(labels, error, capacity);
            }
            completer.complete(result);
        });

        completion
    }

    fn take_pending_errors(&self) -> PendingErrors {
        std::mem::take(&mut self.lock().pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ReadRequest, RedisResponse, SetMode, WriteRequest};
    use crate::metrics::MetricEntity;
    use bytes::Bytes;

    const TABLE: &str = ".redis";

    async fn connect(cluster: &LocalCluster) -> (Arc<dyn StorageClient>, Table) {
        let client = ClientBuilder::new()
            .client_name("test")
            .add_master_server_addr("127.0.0.1:7100")
            .build(cluster)
            .await
            .unwrap();
        let table = client.open_table(&TableName::new(TABLE)).await.unwrap();
        (client, table)
    }

    fn set_op(table: &Table, key: &str, value: &str) -> WriteOp {
        let mut op = table.new_write_op();
        op.set_request(WriteRequest::Set {
            key: Bytes::from(key.to_string()),
            value: Bytes::from(value.to_string()),
            ttl: None,
            mode: SetMode::Always,
        });
        op
    }

    fn get_op(table: &Table, key: &str) -> ReadOp {
        let mut op = table.new_read_op();
        op.set_request(ReadRequest::Get {
            key: Bytes::from(key.to_string()),
        });
        op
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let cluster = LocalCluster::with_table(TABLE);
        let (client, table) = connect(&cluster).await;
        assert_eq!(client.client_name(), "test");

        let session = client.new_session(false);
        session.set_flush_mode(FlushMode::ManualFlush).unwrap();
        session.apply(set_op(&table, "k", "v")).unwrap();
        let flushed = session.flush_async().await.unwrap();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].response(), Some(&RedisResponse::Ok));

        let reader = client.new_session(true);
        let op = reader.read_async(get_op(&table, "k")).await.unwrap();
        assert_eq!(op.into_response(), Some(RedisResponse::Bulk(Bytes::from("v"))));
    }

    #[tokio::test]
    async fn test_auto_flush_applies_immediately() {
        let cluster = LocalCluster::with_table(TABLE);
        let (client, table) = connect(&cluster).await;

        let session = client.new_session(false);
        session.apply(set_op(&table, "k", "v")).unwrap();
        assert_eq!(session.flush_async().await.unwrap().len(), 0);

        let store = cluster.table_store(&TableName::new(TABLE)).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_session_rejects_writes() {
        let cluster = LocalCluster::with_table(TABLE);
        let (client, table) = connect(&cluster).await;

        let session = client.new_session(true);
        assert!(session.is_read_only());
        assert!(matches!(
            session.apply(set_op(&table, "k", "v")),
            Err(BackendError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_and_missing_table() {
        let cluster = LocalCluster::new();
        cluster.set_reachable(false);

        let builder = ClientBuilder::new().add_master_server_addr("m1:7100,m2:7100");
        let Err(err) = builder.build(&cluster).await else {
            panic!("connect succeeded against an unreachable cluster");
        };
        assert_eq!(
            err,
            BackendError::NetworkError("could not connect to masters m1:7100,m2:7100".into())
        );

        cluster.set_reachable(true);
        let client = builder.build(&cluster).await.unwrap();
        let err = client
            .open_table(&TableName::new(TABLE))
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::NotFound("table .redis does not exist".into()));
        assert_eq!(cluster.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_flush_timeout_records_pending_errors() {
        let cluster = LocalCluster::with_table(TABLE);
        let (client, table) = connect(&cluster).await;
        cluster.set_latency(Duration::from_millis(200));

        let session = client.new_session(false);
        session.set_flush_mode(FlushMode::ManualFlush).unwrap();
        session.set_timeout(Duration::from_millis(20));
        session.apply(set_op(&table, "a", "1")).unwrap();
        session.apply(set_op(&table, "b", "2")).unwrap();

        let err = session.flush_async().await.unwrap_err();
        assert!(err.is_timed_out());

        let pending = session.take_pending_errors();
        assert_eq!(pending.errors.len(), 2);
        assert_eq!(pending.errors[0].operation, "REDIS_WRITE a");
        assert!(!pending.overflowed);
        assert!(session.take_pending_errors().errors.is_empty());
    }

    #[tokio::test]
    async fn test_pending_errors_overflow() {
        let cluster = LocalCluster::with_table(TABLE);
        let (client, table) = connect(&cluster).await;
        cluster.set_pending_error_capacity(1);
        cluster.fail_flushes_with(Some(BackendError::IoError("disk full".into())));

        let session = client.new_session(false);
        session.set_flush_mode(FlushMode::ManualFlush).unwrap();
        session.apply(set_op(&table, "a", "1")).unwrap();
        session.apply(set_op(&table, "b", "2")).unwrap();

        let err = session.flush_async().await.unwrap_err();
        assert_eq!(err, BackendError::IoError("disk full".into()));

        let pending = session.take_pending_errors();
        assert_eq!(pending.errors.len(), 1);
        assert!(pending.overflowed);
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let cluster = LocalCluster::with_table(TABLE);
        let (client, table) = connect(&cluster).await;
        cluster.set_latency(Duration::from_millis(200));

        let session = client.new_session(true);
        session.set_timeout(Duration::from_millis(10));
        let err = session.read_async(get_op(&table, "k")).await.unwrap_err();
        assert_eq!(
            err,
            BackendError::TimedOut("REDIS_READ k timed out after 10 ms".into())
        );
    }

    #[tokio::test]
    async fn test_dropped_table_is_not_found() {
        let cluster = LocalCluster::with_table(TABLE);
        let (client, table) = connect(&cluster).await;
        let name = TableName::new(TABLE);

        assert!(cluster.drop_table(&name));
        assert!(!cluster.drop_table(&name));
        assert!(cluster.table_store(&name).is_none());

        let err = client.open_table(&name).await.unwrap_err();
        assert_eq!(err, BackendError::NotFound("table .redis does not exist".into()));

        // Handles opened before the drop fail on use.
        let session = client.new_session(true);
        let err = session.read_async(get_op(&table, "k")).await.unwrap_err();
        assert_eq!(err, BackendError::NotFound("table .redis does not exist".into()));
    }

    #[tokio::test]
    async fn test_rpc_latency_recorded_with_metric_entity() {
        let cluster = LocalCluster::with_table(TABLE);
        let metrics = Arc::new(MetricEntity::new("test"));
        let client = ClientBuilder::new()
            .add_master_server_addr("127.0.0.1:7100")
            .metric_entity(Arc::clone(&metrics))
            .build(&cluster)
            .await
            .unwrap();
        let table = client.open_table(&TableName::new(TABLE)).await.unwrap();

        let session = client.new_session(false);
        session.set_flush_mode(FlushMode::ManualFlush).unwrap();
        session.apply(set_op(&table, "k", "v")).unwrap();
        session.flush_async().await.unwrap();
        session.read_async(get_op(&table, "k")).await.unwrap();

        // Empty flushes never reach the cluster.
        session.flush_async().await.unwrap();

        let histogram = metrics.histogram(LOCAL_CLIENT_RPC_LATENCY.name).unwrap();
        assert_eq!(histogram.count(), 2);
    }
}
