//! Backend Operations
//!
//! A backend operation is a request payload plus a response slot. The
//! per-command parsers fill the request; the backend fills the response when
//! the operation succeeds. Reads and writes share the same [`Operation`]
//! shape and differ only in their request type.

use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Name of a backend table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opened table. Operations are allocated from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    name: TableName,
    id: String,
}

impl Table {
    pub fn new(name: TableName, id: impl Into<String>) -> Self {
        Self {
            name,
            id: id.into(),
        }
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Allocates an empty read operation against this table.
    pub fn new_read_op(&self) -> ReadOp {
        Operation::new(self.name.clone())
    }

    /// Allocates an empty write operation against this table.
    pub fn new_write_op(&self) -> WriteOp {
        Operation::new(self.name.clone())
    }
}

/// Read requests understood by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadRequest {
    Get { key: Bytes },
    HGet { key: Bytes, field: Bytes },
    StrLen { key: Bytes },
    Exists { key: Bytes },
    GetRange { key: Bytes, start: i64, end: i64 },
}

/// Conditional behavior of a SET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    #[default]
    Always,
    /// NX: only set when the key does not exist
    IfAbsent,
    /// XX: only set when the key already exists
    IfPresent,
}

/// Write requests understood by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteRequest {
    Set {
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
        mode: SetMode,
    },
    HSet {
        key: Bytes,
        field: Bytes,
        value: Bytes,
    },
    GetSet {
        key: Bytes,
        value: Bytes,
    },
    Append {
        key: Bytes,
        value: Bytes,
    },
    Del {
        key: Bytes,
    },
    SetRange {
        key: Bytes,
        offset: usize,
        value: Bytes,
    },
    Incr {
        key: Bytes,
        delta: i64,
    },
}

/// Common accessors for request payloads.
pub trait OperationRequest: fmt::Debug + Clone + Send + 'static {
    /// Prefix used when the operation is printed.
    const KIND: &'static str;

    /// The key the request targets.
    fn key(&self) -> &Bytes;
}

impl OperationRequest for ReadRequest {
    const KIND: &'static str = "REDIS_READ";

    fn key(&self) -> &Bytes {
        match self {
            ReadRequest::Get { key }
            | ReadRequest::HGet { key, .. }
            | ReadRequest::StrLen { key }
            | ReadRequest::Exists { key }
            | ReadRequest::GetRange { key, .. } => key,
        }
    }
}

impl OperationRequest for WriteRequest {
    const KIND: &'static str = "REDIS_WRITE";

    fn key(&self) -> &Bytes {
        match self {
            WriteRequest::Set { key, .. }
            | WriteRequest::HSet { key, .. }
            | WriteRequest::GetSet { key, .. }
            | WriteRequest::Append { key, .. }
            | WriteRequest::Del { key }
            | WriteRequest::SetRange { key, .. }
            | WriteRequest::Incr { key, .. } => key,
        }
    }
}

/// The typed result of a backend operation.
///
/// Command-level failures such as a type mismatch travel inside a successful
/// response; they are not backend errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisResponse {
    Ok,
    Nil,
    Bulk(Bytes),
    Integer(i64),
    WrongType,
    Error(String),
}

/// A backend operation: request payload plus response slot.
#[derive(Debug, Clone)]
pub struct Operation<R> {
    table: TableName,
    request: Option<R>,
    response: Option<RedisResponse>,
}

/// A read-style operation.
pub type ReadOp = Operation<ReadRequest>;

/// A write-style operation.
pub type WriteOp = Operation<WriteRequest>;

impl<R: OperationRequest> Operation<R> {
    /// Creates an empty operation. Use [`Table::new_read_op`] or
    /// [`Table::new_write_op`] from pipeline code.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            request: None,
            response: None,
        }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn request(&self) -> Option<&R> {
        self.request.as_ref()
    }

    pub fn set_request(&mut self, request: R) {
        self.request = Some(request);
    }

    /// The response, present only after the backend completed the op.
    pub fn response(&self) -> Option<&RedisResponse> {
        self.response.as_ref()
    }

    pub fn set_response(&mut self, response: RedisResponse) {
        self.response = Some(response);
    }

    pub fn into_response(self) -> Option<RedisResponse> {
        self.response
    }
}

impl<R: OperationRequest> fmt::Display for Operation<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.request {
            Some(request) => write!(
                f,
                "{} {}",
                R::KIND,
                String::from_utf8_lossy(request.key())
            ),
            None => write!(f, "{} <unset>", R::KIND),
        }
    }
}
