//! Handler latency histogram declarations, one per command plus the
//! internal error and backend round-trip histograms.

use crate::metrics::HistogramDescriptor;

pub static HANDLER_LATENCY_GET: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_get",
    "redis GET RPC time",
    "Microseconds spent handling GET commands",
);

pub static HANDLER_LATENCY_HGET: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_hget",
    "redis HGET RPC time",
    "Microseconds spent handling HGET commands",
);

pub static HANDLER_LATENCY_STRLEN: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_strlen",
    "redis STRLEN RPC time",
    "Microseconds spent handling STRLEN commands",
);

pub static HANDLER_LATENCY_EXISTS: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_exists",
    "redis EXISTS RPC time",
    "Microseconds spent handling EXISTS commands",
);

pub static HANDLER_LATENCY_GETRANGE: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_getrange",
    "redis GETRANGE RPC time",
    "Microseconds spent handling GETRANGE commands",
);

pub static HANDLER_LATENCY_SET: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_set",
    "redis SET RPC time",
    "Microseconds spent handling SET commands",
);

pub static HANDLER_LATENCY_HSET: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_hset",
    "redis HSET RPC time",
    "Microseconds spent handling HSET commands",
);

pub static HANDLER_LATENCY_GETSET: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_getset",
    "redis GETSET RPC time",
    "Microseconds spent handling GETSET commands",
);

pub static HANDLER_LATENCY_APPEND: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_append",
    "redis APPEND RPC time",
    "Microseconds spent handling APPEND commands",
);

pub static HANDLER_LATENCY_DEL: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_del",
    "redis DEL RPC time",
    "Microseconds spent handling DEL commands",
);

pub static HANDLER_LATENCY_SETRANGE: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_setrange",
    "redis SETRANGE RPC time",
    "Microseconds spent handling SETRANGE commands",
);

pub static HANDLER_LATENCY_INCR: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_incr",
    "redis INCR RPC time",
    "Microseconds spent handling INCR commands",
);

pub static HANDLER_LATENCY_ECHO: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_echo",
    "redis ECHO RPC time",
    "Microseconds spent handling ECHO commands",
);

/// Unsupported, malformed and uninitialized-backend calls.
pub static HANDLER_LATENCY_ERROR: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_error",
    "redis error RPC time",
    "Microseconds spent handling calls that failed before reaching the backend",
);

/// Backend read round-trip, submission to completion.
pub static HANDLER_LATENCY_GET_INTERNAL: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_get_internal",
    "backend read RPC time",
    "Microseconds spent in backend read round-trips",
);

/// Backend write round-trip, flush to completion.
pub static HANDLER_LATENCY_SET_INTERNAL: HistogramDescriptor = HistogramDescriptor::handler_latency(
    "handler_latency_redis_set_internal",
    "backend write RPC time",
    "Microseconds spent in backend write round-trips",
);
