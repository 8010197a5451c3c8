//! Storage Client Interface
//!
//! Everything FlashGate needs from the distributed storage client it sits in
//! front of: the client/session/table interfaces, the read and write
//! operation types, one-shot completions and the backend status type.
//!
//! The in-process implementation lives in [`crate::storage`].

pub mod builder;
pub mod completion;
pub mod error;
pub mod ops;
pub mod session;

pub use builder::{ClientBuilder, DEFAULT_RPC_TIMEOUT};
pub use completion::{completion, Completer, Completion};
pub use error::BackendError;
pub use ops::{
    Operation, OperationRequest, ReadOp, ReadRequest, RedisResponse, SetMode, Table, TableName,
    WriteOp, WriteRequest,
};
pub use session::{Connector, FlushMode, OpError, PendingErrors, Session, StorageClient};
