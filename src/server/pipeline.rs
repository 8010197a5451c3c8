//! Read and Write Pipelines
//!
//! Both pipelines run a short synchronous phase on the dispatching task
//! (open a session, allocate and parse the operation, submit it) and then
//! hand a pending operation to a spawned completion task. The dispatching
//! task never waits on the backend.
//!
//! ```text
//! execute_read                         execute_write
//!   new_session(read_only)               new_session(read_write)
//!   new_read_op + parse                  new_write_op + parse
//!   read_async(op) ──┐                   apply(op); flush_async() ──┐
//!                    ▼                                              ▼
//!             PendingRead::complete                      PendingWrite::complete
//!               get_internal += rtt                        set_internal += rtt
//!               respond success/failure                    on failure: drain and
//!                                                          log pending errors
//!                                                          respond success/failure
//! ```
//!
//! A pending operation owns the call and the session, and `complete`
//! consumes it, so each submitted operation is completed exactly once.

use crate::client::{
    BackendError, Completion, FlushMode, ReadOp, RedisResponse, Session, WriteOp,
};
use crate::commands::{CommandEntry, ReadParser, WriteParser};
use crate::metrics::Histogram;
use crate::server::guard::ConnectedBackend;
use crate::server::response::{respond_failure, respond_success, respond_with_failure, to_resp};
use crate::server::InboundCall;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// What a pipeline needs besides the call itself.
#[derive(Debug, Clone, Copy)]
pub struct PipelineContext<'a> {
    pub backend: &'a ConnectedBackend,
    pub timeout: Duration,
    pub error_latency: &'a Arc<Histogram>,
    pub internal_latency: &'a Arc<Histogram>,
}

fn open_session(
    ctx: &PipelineContext<'_>,
    read_only: bool,
) -> Result<Arc<dyn Session>, BackendError> {
    let session = ctx.backend.client.new_session(read_only);
    session.set_timeout(ctx.timeout);
    session.set_flush_mode(FlushMode::ManualFlush)?;
    Ok(session)
}

/// Parses and submits a read; the response is sent from a spawned task.
pub fn execute_read(
    call: InboundCall,
    command: &CommandEntry,
    parse: ReadParser,
    ctx: PipelineContext<'_>,
) {
    debug!(command = command.info.name, "Processing read");

    let session = match open_session(&ctx, true) {
        Ok(session) => session,
        Err(status) => return respond_failure(call, &status, &command.latency),
    };

    let mut op = ctx.backend.table.new_read_op();
    if let Err(e) = parse(&mut op, call.args()) {
        return respond_with_failure(&e.to_string(), call, ctx.error_latency);
    }

    let started = Instant::now();
    let completion = session.read_async(op);
    let pending = PendingRead {
        call,
        session,
        completion,
        latency: Arc::clone(&command.latency),
        internal_latency: Arc::clone(ctx.internal_latency),
        started,
    };
    tokio::spawn(pending.complete());
}

/// Parses, applies and flushes a write; the response is sent from a
/// spawned task.
pub fn execute_write(
    call: InboundCall,
    command: &CommandEntry,
    parse: WriteParser,
    ctx: PipelineContext<'_>,
) {
    debug!(command = command.info.name, "Processing write");

    let session = match open_session(&ctx, false) {
        Ok(session) => session,
        Err(status) => return respond_failure(call, &status, &command.latency),
    };

    let mut op = ctx.backend.table.new_write_op();
    if let Err(e) = parse(&mut op, call.args()) {
        return respond_with_failure(&e.to_string(), call, ctx.error_latency);
    }

    if let Err(status) = session.apply(op) {
        return respond_failure(call, &status, &command.latency);
    }

    let started = Instant::now();
    let completion = session.flush_async();
    let pending = PendingWrite {
        call,
        session,
        completion,
        latency: Arc::clone(&command.latency),
        internal_latency: Arc::clone(ctx.internal_latency),
        started,
    };
    tokio::spawn(pending.complete());
}

/// A submitted read waiting for its completion.
struct PendingRead {
    call: InboundCall,
    /// Held until the completion ran.
    session: Arc<dyn Session>,
    completion: Completion<ReadOp>,
    latency: Arc<Histogram>,
    internal_latency: Arc<Histogram>,
    started: Instant,
}

impl PendingRead {
    async fn complete(self) {
        let result = self.completion.await;
        self.internal_latency.increment_since(self.started);
        trace!(ok = result.is_ok(), "Read completed");

        match result.and_then(|op| single_response(op.into_response())) {
            Ok(response) => respond_success(self.call, to_resp(response), &self.latency),
            Err(status) => respond_failure(self.call, &status, &self.latency),
        }
        drop(self.session);
    }
}

/// A flushed write waiting for its completion.
struct PendingWrite {
    call: InboundCall,
    session: Arc<dyn Session>,
    completion: Completion<Vec<WriteOp>>,
    latency: Arc<Histogram>,
    internal_latency: Arc<Histogram>,
    started: Instant,
}

impl PendingWrite {
    async fn complete(self) {
        let result = self.completion.await;
        self.internal_latency.increment_since(self.started);
        trace!(ok = result.is_ok(), "Write completed");

        let result = result.and_then(|ops| {
            single_response(ops.into_iter().next().and_then(WriteOp::into_response))
        });
        match result {
            Ok(response) => respond_success(self.call, to_resp(response), &self.latency),
            Err(status) => {
                let pending = self.session.take_pending_errors();
                for error in &pending.errors {
                    warn!(
                        operation = %error.operation,
                        error = %error.error,
                        "Explicit error while inserting"
                    );
                }
                if pending.overflowed {
                    warn!("Pending error buffer overflowed, some errors were dropped");
                }
                respond_failure(self.call, &status, &self.latency);
            }
        }
    }
}

fn single_response(response: Option<RedisResponse>) -> Result<RedisResponse, BackendError> {
    response.ok_or_else(|| {
        BackendError::IllegalState("backend completed the operation without a response".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientBuilder, PendingErrors, StorageClient, Table, TableName};
    use crate::commands::{parsers, CommandRegistry};
    use crate::metrics::MetricEntity;
    use crate::protocol::{CommandArgs, RespValue};
    use crate::server::guard::{ClientGuard, REDIS_TABLE_NAME};
    use crate::storage::LocalCluster;
    use async_trait::async_trait;

    struct Fixture {
        cluster: LocalCluster,
        guard: ClientGuard,
        registry: CommandRegistry,
        metrics: Arc<MetricEntity>,
    }

    impl Fixture {
        async fn new() -> Self {
            let cluster = LocalCluster::with_table(REDIS_TABLE_NAME);
            let metrics = Arc::new(MetricEntity::default());
            let guard = ClientGuard::new(Arc::new(cluster.clone()), Arc::clone(&metrics));
            guard
                .ensure_initialized(&["127.0.0.1:7100".to_string()])
                .await
                .unwrap();
            let registry = CommandRegistry::build(&metrics).unwrap();
            Self {
                cluster,
                guard,
                registry,
                metrics,
            }
        }

        fn ctx(&self, read: bool) -> PipelineContext<'_> {
            PipelineContext {
                backend: self.guard.get().unwrap(),
                timeout: Duration::from_millis(50),
                error_latency: self.registry.error_latency(),
                internal_latency: if read {
                    self.registry.read_internal_latency()
                } else {
                    self.registry.write_internal_latency()
                },
            }
        }

        async fn write(&self, parse: WriteParser, parts: &[&str]) -> RespValue {
            let args = CommandArgs::from_strs(parts).unwrap();
            let entry = self.registry.resolve(&args).unwrap();
            let (call, rx) = InboundCall::new(args);
            execute_write(call, entry, parse, self.ctx(false));
            rx.await.unwrap()
        }

        async fn read(&self, parse: ReadParser, parts: &[&str]) -> RespValue {
            let args = CommandArgs::from_strs(parts).unwrap();
            let entry = self.registry.resolve(&args).unwrap();
            let (call, rx) = InboundCall::new(args);
            execute_read(call, entry, parse, self.ctx(true));
            rx.await.unwrap()
        }

        fn count(&self, name: &str) -> u64 {
            self.metrics.histogram(name).unwrap().count()
        }
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let f = Fixture::new().await;

        assert_eq!(
            f.write(parsers::parse_set, &["SET", "k", "v"]).await,
            RespValue::ok()
        );
        assert_eq!(
            f.read(parsers::parse_get, &["GET", "k"]).await,
            RespValue::bulk_string("v")
        );

        assert_eq!(f.count("handler_latency_redis_set"), 1);
        assert_eq!(f.count("handler_latency_redis_set_internal"), 1);
        assert_eq!(f.count("handler_latency_redis_get"), 1);
        assert_eq!(f.count("handler_latency_redis_get_internal"), 1);
    }

    #[tokio::test]
    async fn test_parse_error_skips_backend() {
        let f = Fixture::new().await;

        let response = f
            .read(parsers::parse_getrange, &["GETRANGE", "k", "a", "1"])
            .await;
        assert_eq!(
            response,
            RespValue::error(
                "ERR Runtime error: value is not an integer or out of range : GETRANGE"
            )
        );
        assert_eq!(f.count("handler_latency_redis_error"), 1);
        assert_eq!(f.count("handler_latency_redis_get_internal"), 0);

        let store = f
            .cluster
            .table_store(&TableName::new(REDIS_TABLE_NAME))
            .unwrap();
        assert_eq!(store.stats().reads, 0);
    }

    #[tokio::test]
    async fn test_flush_timeout_responds_failure() {
        let f = Fixture::new().await;
        f.cluster.set_latency(Duration::from_millis(500));

        let response = f.write(parsers::parse_set, &["SET", "k", "v"]).await;
        assert_eq!(
            response,
            RespValue::error("ERR Timed out: flush of 1 operations timed out after 50 ms")
        );
        assert_eq!(f.count("handler_latency_redis_set"), 1);
        assert_eq!(f.count("handler_latency_redis_set_internal"), 1);
    }

    #[tokio::test]
    async fn test_read_timeout_responds_failure() {
        let f = Fixture::new().await;
        f.cluster.set_latency(Duration::from_millis(500));

        let response = f.read(parsers::parse_get, &["GET", "k"]).await;
        assert_eq!(
            response,
            RespValue::error("ERR Timed out: REDIS_READ k timed out after 50 ms")
        );
    }

    /// Session wrapper keeping a copy of every pending-error drain.
    struct RecordingSession {
        inner: Arc<dyn Session>,
        drained: Arc<std::sync::Mutex<Vec<PendingErrors>>>,
    }

    impl Session for RecordingSession {
        fn is_read_only(&self) -> bool {
            self.inner.is_read_only()
        }

        fn set_timeout(&self, timeout: Duration) {
            self.inner.set_timeout(timeout)
        }

        fn set_flush_mode(&self, mode: FlushMode) -> Result<(), BackendError> {
            self.inner.set_flush_mode(mode)
        }

        fn read_async(&self, op: ReadOp) -> Completion<ReadOp> {
            self.inner.read_async(op)
        }

        fn apply(&self, op: WriteOp) -> Result<(), BackendError> {
            self.inner.apply(op)
        }

        fn flush_async(&self) -> Completion<Vec<WriteOp>> {
            self.inner.flush_async()
        }

        fn take_pending_errors(&self) -> PendingErrors {
            let pending = self.inner.take_pending_errors();
            self.drained.lock().unwrap().push(pending.clone());
            pending
        }
    }

    struct RecordingClient {
        inner: Arc<dyn StorageClient>,
        drained: Arc<std::sync::Mutex<Vec<PendingErrors>>>,
    }

    #[async_trait]
    impl StorageClient for RecordingClient {
        fn client_name(&self) -> &str {
            self.inner.client_name()
        }

        async fn open_table(&self, name: &TableName) -> Result<Table, BackendError> {
            self.inner.open_table(name).await
        }

        fn new_session(&self, read_only: bool) -> Arc<dyn Session> {
            Arc::new(RecordingSession {
                inner: self.inner.new_session(read_only),
                drained: Arc::clone(&self.drained),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_flush_drains_pending_errors() {
        let cluster = LocalCluster::with_table(REDIS_TABLE_NAME);
        let inner = ClientBuilder::new()
            .add_master_server_addr("127.0.0.1:7100")
            .build(&cluster)
            .await
            .unwrap();
        let table = inner
            .open_table(&TableName::new(REDIS_TABLE_NAME))
            .await
            .unwrap();
        let drained = Arc::new(std::sync::Mutex::new(Vec::new()));
        let backend = ConnectedBackend {
            client: Arc::new(RecordingClient {
                inner,
                drained: Arc::clone(&drained),
            }),
            table,
        };

        let metrics = MetricEntity::default();
        let registry = CommandRegistry::build(&metrics).unwrap();
        let ctx = PipelineContext {
            backend: &backend,
            timeout: Duration::from_millis(20),
            error_latency: registry.error_latency(),
            internal_latency: registry.write_internal_latency(),
        };
        let send = |parts: &[&str]| {
            let args = CommandArgs::from_strs(parts).unwrap();
            let entry = registry.resolve(&args).unwrap();
            let (call, rx) = InboundCall::new(args);
            execute_write(call, entry, parsers::parse_set, ctx);
            rx
        };

        assert_eq!(send(&["SET", "ok", "v"]).await.unwrap(), RespValue::ok());
        assert!(drained.lock().unwrap().is_empty());

        cluster.set_latency(Duration::from_millis(300));
        let response = send(&["SET", "k", "v"]).await.unwrap();
        assert_eq!(
            response,
            RespValue::error("ERR Timed out: flush of 1 operations timed out after 20 ms")
        );

        let drained = drained.lock().unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].errors.len(), 1);
        assert_eq!(drained[0].errors[0].operation, "REDIS_WRITE k");
        assert!(drained[0].errors[0].error.is_timed_out());
        assert!(!drained[0].overflowed);
    }

    #[tokio::test]
    async fn test_command_level_errors_are_successes() {
        let f = Fixture::new().await;

        f.write(parsers::parse_hset, &["HSET", "h", "f", "v"]).await;
        let response = f.read(parsers::parse_get, &["GET", "h"]).await;
        assert!(response.is_error());
        assert_eq!(f.count("handler_latency_redis_error"), 0);
    }
}
