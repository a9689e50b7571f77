//! Statement execution and result handling.
//!
//! The query module is organized into:
//! - `executor` - refine, classify, bind and run one statement
//! - `batch` - many parameter rows over one prepared statement
//! - `results` - write results and row cursors
//! - `scan` - row materialization into caller destinations

pub mod batch;
pub mod executor;
pub mod results;
pub mod scan;

pub use batch::execute_batch;
pub use executor::Invocation;
pub use results::{ExecResult, QueryResult, QueryRowResult};
pub use scan::{
    ExactStrategy, FieldAssign, FieldNameConvertStrategy, ScanTarget, Scannable,
    SnakeCaseStrategy, ValueSlot,
};
