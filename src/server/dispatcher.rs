//! Command Dispatcher
//!
//! [`RedisService`] is the entry point of the dispatch core: the transport
//! hands it one [`InboundCall`] per command and awaits the call's receiver.
//!
//! ## Dispatch Order
//!
//! ```text
//! handle(call)
//!   1. resolve the command name (case-insensitive)
//!   2. ensure the backend client and .redis table   → "Could not open .redis table. …"
//!   3. unknown command                              → "Unsupported call."
//!   4. arity                                        → "Too few arguments."
//!                                                     "Wrong number of arguments."
//!   5. Echo | Read(parser) | Write(parser)
//! ```
//!
//! Every failure in steps 2 to 4 is answered with `-ERR Runtime error:
//! <message> : <command token>` and recorded in the `error` histogram.

use crate::client::Connector;
use crate::commands::{CommandEntry, CommandRegistry, Handler, RegistryError};
use crate::config::ServiceConfig;
use crate::metrics::MetricEntity;
use crate::protocol::RespValue;
use crate::server::guard::ClientGuard;
use crate::server::pipeline::{execute_read, execute_write, PipelineContext};
use crate::server::response::{respond_success, respond_with_failure};
use crate::server::InboundCall;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// The Redis command service.
pub struct RedisService {
    config: ServiceConfig,
    client_timeout: Duration,
    registry: CommandRegistry,
    guard: ClientGuard,
    metrics: Arc<MetricEntity>,
}

impl RedisService {
    /// Builds the service and validates the command table.
    ///
    /// Fails when the command table does not match the expected command
    /// set; the server must not start in that case. No backend connection
    /// is made here.
    pub fn new(
        config: ServiceConfig,
        connector: Arc<dyn Connector>,
        metrics: Arc<MetricEntity>,
    ) -> Result<Self, RegistryError> {
        let registry = CommandRegistry::build(&metrics)?;
        debug!(commands = registry.len(), "Command registry built");

        Ok(Self {
            client_timeout: config.client_timeout(),
            config,
            registry,
            guard: ClientGuard::new(connector, Arc::clone(&metrics)),
            metrics,
        })
    }

    pub fn metrics(&self) -> &Arc<MetricEntity> {
        &self.metrics
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Dispatches one command. The response is sent through `call`, possibly
    /// after this method returned.
    pub async fn handle(&self, call: InboundCall) {
        let command = self.registry.resolve(call.args());

        let backend = match self
            .guard
            .ensure_initialized(&self.config.master_addresses)
            .await
        {
            Ok(backend) => backend,
            Err(e) => {
                error!(error = %e, "Could not open .redis table");
                return respond_with_failure(
                    &format!("Could not open .redis table. {e}"),
                    call,
                    self.registry.error_latency(),
                );
            }
        };

        let Some(command) = command else {
            return respond_with_failure("Unsupported call.", call, self.registry.error_latency());
        };

        if let Err(e) = command.info.arity.check(call.args().len()) {
            error!(
                command = command.info.name,
                argc = call.args().len(),
                arity = ?command.info.arity,
                "{e}"
            );
            return respond_with_failure(&e.to_string(), call, self.registry.error_latency());
        }

        match command.info.handler {
            Handler::Echo => self.echo(call, command),
            Handler::Read(parse) => execute_read(
                call,
                command,
                parse,
                PipelineContext {
                    backend,
                    timeout: self.client_timeout,
                    error_latency: self.registry.error_latency(),
                    internal_latency: self.registry.read_internal_latency(),
                },
            ),
            Handler::Write(parse) => execute_write(
                call,
                command,
                parse,
                PipelineContext {
                    backend,
                    timeout: self.client_timeout,
                    error_latency: self.registry.error_latency(),
                    internal_latency: self.registry.write_internal_latency(),
                },
            ),
        }
    }

    /// ECHO message: answered locally.
    fn echo(&self, call: InboundCall, command: &CommandEntry) {
        let message = call.args()[1].clone();
        respond_success(call, RespValue::bulk_string(message), &command.latency);
    }
}

impl std::fmt::Debug for RedisService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisService")
            .field("config", &self.config)
            .field("commands", &self.registry.len())
            .field("guard", &self.guard)
            .finish()
    }
}
