//! Backend driver abstraction traits.
//!
//! The mapper never talks to a database directly. A [`Backend`] supplies
//! plain execution, prepared statements and transactions, and hands back
//! [`RowCursor`]s for reads. Connection pooling, timeouts and wire details
//! belong to the implementation.

use crate::error::DriverError;
use crate::types::Value;
use async_trait::async_trait;
use std::fmt;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows changed by the statement
    pub rows_affected: i64,
    /// Generated identifier, when the driver reports one
    pub last_insert_id: Option<i64>,
}

impl ExecOutcome {
    pub fn new(rows_affected: i64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
        }
    }
}

/// Forward-only iterator over result rows.
#[async_trait]
pub trait RowCursor: Send {
    /// Column names of the result, in order.
    fn columns(&self) -> Vec<String>;

    /// Fetch the next row, or `None` when the result is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the row cannot be fetched.
    async fn next_row(&mut self) -> Result<Option<Vec<Value>>, DriverError>;

    /// Release the cursor. Calling it more than once has no effect.
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// A statement prepared once and executed many times.
#[async_trait]
pub trait PreparedHandle: Send + Sync {
    /// Execute with one argument list.
    ///
    /// # Arguments
    ///
    /// * `args` - Values for the statement's placeholders, in order
    ///
    /// # Errors
    ///
    /// Returns `DriverError::BadConnection` when the connection was lost.
    async fn exec(&self, args: &[Value]) -> Result<ExecOutcome, DriverError>;

    /// Run as a query with one argument list.
    async fn query(&self, args: &[Value]) -> Result<Box<dyn RowCursor>, DriverError>;

    /// Release the statement.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Operations shared by a backend and an open transaction.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    /// Execute a write statement.
    ///
    /// # Arguments
    ///
    /// * `sql` - Statement text in native placeholder syntax
    /// * `args` - Values for the placeholders
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if execution fails.
    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome, DriverError>;

    /// Run a read statement.
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn RowCursor>, DriverError>;

    /// Prepare a statement for repeated execution.
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedHandle>, DriverError>;
}

/// A database the mapper executes against.
#[async_trait]
pub trait Backend: SqlRunner {
    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the transaction cannot be started.
    async fn begin(&self) -> Result<Box<dyn TransactionBackend>, DriverError>;

    /// Close the backend and every connection it holds.
    async fn close(&self) -> Result<(), DriverError>;
}

/// An open transaction.
///
/// Dropping a handle that was neither committed nor rolled back must roll
/// the transaction back.
#[async_trait]
pub trait TransactionBackend: SqlRunner {
    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}

/// A cursor plus the statement it was read from, when the caller owns that
/// statement.
pub struct QueryCursor {
    pub rows: Box<dyn RowCursor>,
    pub statement: Option<Box<dyn PreparedHandle>>,
}

impl QueryCursor {
    pub fn new(rows: Box<dyn RowCursor>, statement: Option<Box<dyn PreparedHandle>>) -> Self {
        Self { rows, statement }
    }
}

impl fmt::Debug for QueryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCursor")
            .field("columns", &self.rows.columns())
            .field("owns_statement", &self.statement.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Cursor {}

        #[async_trait]
        impl RowCursor for Cursor {
            fn columns(&self) -> Vec<String>;
            async fn next_row(&mut self) -> Result<Option<Vec<Value>>, DriverError>;
            async fn close(&mut self) -> Result<(), DriverError>;
        }
    }

    #[test]
    fn test_exec_outcome() {
        let outcome = ExecOutcome::new(3, Some(10));
        assert_eq!(outcome.rows_affected, 3);
        assert_eq!(outcome.last_insert_id, Some(10));
        assert_eq!(ExecOutcome::default().last_insert_id, None);
    }

    #[tokio::test]
    async fn test_query_cursor_debug() {
        let mut cursor = MockCursor::new();
        cursor
            .expect_columns()
            .return_const(vec!["id".to_string()]);
        cursor.expect_close().returning(|| Ok(()));

        let mut query = QueryCursor::new(Box::new(cursor), None);
        let rendered = format!("{query:?}");
        assert!(rendered.contains("\"id\""));
        assert!(rendered.contains("owns_statement: false"));
        query.rows.close().await.unwrap();
    }
}
