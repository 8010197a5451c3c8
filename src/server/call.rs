//! Inbound Calls
//!
//! An [`InboundCall`] is one tokenized command waiting for its answer. The
//! transport creates it together with a receiver and awaits the receiver;
//! the dispatch path answers through the call. Both respond methods consume
//! the call, so each command is answered at most once, and dropping an
//! unanswered call closes the receiver instead of leaving the transport
//! hanging.

use crate::protocol::{CommandArgs, RespValue};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

/// A command received from a client, answered exactly once.
#[derive(Debug)]
pub struct InboundCall {
    args: CommandArgs,
    reply: oneshot::Sender<RespValue>,
    received_at: Instant,
}

impl InboundCall {
    /// Creates a call and the receiver its response will arrive on.
    pub fn new(args: CommandArgs) -> (Self, oneshot::Receiver<RespValue>) {
        let (reply, rx) = oneshot::channel();
        let call = Self {
            args,
            reply,
            received_at: Instant::now(),
        };
        (call, rx)
    }

    pub fn args(&self) -> &CommandArgs {
        &self.args
    }

    /// When the call was created; handler latency is measured from here.
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn respond_success(self, payload: RespValue) {
        self.send(payload);
    }

    /// Sends `-ERR <message>`.
    pub fn respond_failure(self, message: impl AsRef<str>) {
        self.send(RespValue::error(format!("ERR {}", message.as_ref())));
    }

    fn send(self, value: RespValue) {
        if self.reply.send(value).is_err() {
            debug!(
                command = %String::from_utf8_lossy(self.args.name()),
                "Client went away before the response was sent"
            );
        }
    }
}
