//! # stmtmap
//!
//! Declarative SQL statement mapper.
//!
//! Applications register named SQL statements, with optional conditional
//! fragments and named or array placeholders, then invoke them by id. The
//! mapper picks a binding strategy from the shape of the parameters,
//! rewrites `IN` lists to match their length at call time, runs the
//! statement on a pluggable backend and scans result rows back into
//! caller-supplied destinations.
//!
//! ## Example
//!
//! ```no_run
//! # use stmtmap::*;
//! # use std::sync::Arc;
//! # use std::collections::HashMap;
//! # async fn example(backend: Arc<dyn Backend>) -> Result<(), Box<dyn std::error::Error>> {
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//! impl_record!(User { id, name });
//!
//! let mapper = Mapper::builder("postgres://app@localhost/shop".parse()?)
//!     .backend(backend)
//!     .statement(
//!         StatementBuilder::new("findByAge", StatementKind::Select)
//!             .sql("SELECT id, name FROM users WHERE age > :age"),
//!     )
//!     .statement(
//!         StatementBuilder::new("findByIds", StatementKind::Select)
//!             .sql("SELECT id, name FROM users WHERE id IN (:ids[])"),
//!     )
//!     .build()?;
//!
//! let mut by_age = HashMap::new();
//! by_age.insert("age", 30);
//! let users: Vec<User> = mapper
//!     .query("findByAge", &[by_age.to_param()])
//!     .await?
//!     .fetch_all()
//!     .await?;
//!
//! let picked: Vec<User> = mapper
//!     .query("findByIds", &params![vec![1, 2, 3]])
//!     .await?
//!     .fetch_all()
//!     .await?;
//!
//! println!("{} users over 30, {} picked", users.len(), picked.len());
//! mapper.close().await?;
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod binding;
pub mod config;
pub mod driver;
pub mod error;
pub mod mapper;
pub mod monitor;
pub mod normalize;
pub mod query;
pub mod statement;
pub mod types;

// Re-export public API
pub use binding::{Param, ToParam};
pub use config::{FieldNaming, MapperPreference, PreferenceBuilder};
pub use driver::{Backend, PreparedHandle, RowCursor, SqlRunner, TransactionBackend};
pub use error::{
    BindError, ConfigError, ConversionError, DriverError, MapperError, ParamError, ResultError,
    StatementError,
};
pub use mapper::{Bulk, Mapper, MapperBuilder, Transaction};
pub use query::{ExecResult, QueryResult, QueryRowResult, Scannable};
pub use statement::{Statement, StatementBuilder, StatementKind};
pub use types::{FromValue, Value};
