//! Driver abstraction layer.
//!
//! Defines the traits a database driver implements and the proxy the
//! executor calls through.

pub mod protocol;
pub mod proxy;

pub use protocol::{
    Backend, ExecOutcome, PreparedHandle, QueryCursor, RowCursor, SqlRunner, TransactionBackend,
};
pub use proxy::{DirectProxy, ExecutionProxy};
