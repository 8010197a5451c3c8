//! Uniform success and failure responses.
//!
//! Every answer the dispatch core sends goes through one of the three
//! `respond_*` functions here, so each response records exactly one
//! handler-latency sample.

use crate::client::{BackendError, RedisResponse};
use crate::metrics::Histogram;
use crate::protocol::RespValue;
use crate::server::InboundCall;
use tracing::trace;

const WRONGTYPE_MESSAGE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Records the call's latency into `latency` and sends `payload`.
pub fn respond_success(call: InboundCall, payload: RespValue, latency: &Histogram) {
    latency.increment_since(call.received_at());
    call.respond_success(payload);
}

/// Fails a call before it reached the backend.
///
/// The message carries the command token so clients can tell which command
/// of a pipelined batch was rejected.
pub fn respond_with_failure(message: &str, call: InboundCall, error_latency: &Histogram) {
    let args = call.args();
    for (i, arg) in args.iter().enumerate() {
        trace!(index = i, arg = %String::from_utf8_lossy(arg), "Failed call argument");
    }

    let failure = BackendError::RuntimeError(format!(
        "{} : {}",
        message,
        String::from_utf8_lossy(args.name())
    ));
    error_latency.increment_since(call.received_at());
    call.respond_failure(failure.to_string());
}

/// Fails a call with the status the backend returned.
pub fn respond_failure(call: InboundCall, status: &BackendError, latency: &Histogram) {
    latency.increment_since(call.received_at());
    call.respond_failure(status.to_string());
}

/// Converts a backend response into its wire value.
pub fn to_resp(response: RedisResponse) -> RespValue {
    match response {
        RedisResponse::Ok => RespValue::ok(),
        RedisResponse::Nil => RespValue::null(),
        RedisResponse::Bulk(data) => RespValue::bulk_string(data),
        RedisResponse::Integer(n) => RespValue::integer(n),
        RedisResponse::WrongType => RespValue::error(WRONGTYPE_MESSAGE),
        RedisResponse::Error(message) => RespValue::error(format!("ERR {message}")),
    }
}
