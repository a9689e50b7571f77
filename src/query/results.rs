//! Execution and query results.
//!
//! [`ExecResult`] carries what a write did. [`QueryResult`] wraps a cursor
//! and the statement it came from; [`QueryRowResult`] reads exactly one row
//! and releases everything it holds before returning.

use super::scan::{scan_row, FieldNameConvertStrategy, Scannable};
use crate::driver::{ExecOutcome, PreparedHandle, QueryCursor, RowCursor};
use crate::error::{MapperError, ResultError};
use crate::types::Value;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Result of a write: generated ids in row order plus affected rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    insert_ids: Vec<i64>,
    rows_affected: i64,
}

impl ExecResult {
    pub fn new(insert_ids: Vec<i64>, rows_affected: i64) -> Self {
        Self {
            insert_ids,
            rows_affected,
        }
    }

    /// Result of one driver call. The id is kept only when `keep_id` is set.
    pub(crate) fn from_outcome(outcome: ExecOutcome, keep_id: bool) -> Self {
        let insert_ids = if keep_id {
            outcome.last_insert_id.into_iter().collect()
        } else {
            Vec::new()
        };
        Self::new(insert_ids, outcome.rows_affected)
    }

    /// Generated identifiers, one per inserted row.
    pub fn insert_ids(&self) -> &[i64] {
        &self.insert_ids
    }

    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    /// The most recent generated identifier.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::NoInsertId` when nothing was inserted.
    pub fn last_insert_id(&self) -> Result<i64, ResultError> {
        self.insert_ids.last().copied().ok_or(ResultError::NoInsertId)
    }

    pub(crate) fn push_row(&mut self, rows_affected: i64, insert_id: Option<i64>) {
        self.rows_affected += rows_affected;
        self.insert_ids.extend(insert_id);
    }

    pub(crate) fn merge(&mut self, other: ExecResult) {
        self.rows_affected += other.rows_affected;
        self.insert_ids.extend(other.insert_ids);
    }
}

/// Rows returned by a query.
///
/// Must be released with [`QueryResult::close`]; [`QueryResult::fetch_all`]
/// releases it on its own.
pub struct QueryResult {
    rows: Box<dyn RowCursor>,
    statement: Option<Box<dyn PreparedHandle>>,
    columns: Vec<String>,
    current: Option<Vec<Value>>,
    strategy: Arc<dyn FieldNameConvertStrategy>,
    closed: bool,
}

impl QueryResult {
    pub(crate) fn new(cursor: QueryCursor, strategy: Arc<dyn FieldNameConvertStrategy>) -> Self {
        let columns = cursor.rows.columns();
        Self {
            rows: cursor.rows,
            statement: cursor.statement,
            columns,
            current: None,
            strategy,
            closed: false,
        }
    }

    /// Column names of the result.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Advance to the next row. Returns `false` once the rows are exhausted.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::CursorClosed` after `close`, or the driver error
    /// raised while fetching.
    pub async fn next(&mut self) -> Result<bool, MapperError> {
        if self.closed {
            return Err(ResultError::CursorClosed.into());
        }
        self.current = self.rows.next_row().await?;
        Ok(self.current.is_some())
    }

    /// Scan the current row into `dest`.
    pub fn scan<T: Scannable + ?Sized>(&self, dest: &mut T) -> Result<(), MapperError> {
        if self.closed {
            return Err(ResultError::CursorClosed.into());
        }
        let row = self.current.clone().ok_or(ResultError::NoCurrentRow)?;
        scan_row(&self.columns, row, dest, self.strategy.as_ref())
    }

    /// Read every remaining row, then close.
    pub async fn fetch_all<T: Scannable + Default>(mut self) -> Result<Vec<T>, MapperError> {
        let collected = self.collect_rows().await;
        let closed = self.close().await;
        let items = collected?;
        closed?;
        Ok(items)
    }

    async fn collect_rows<T: Scannable + Default>(&mut self) -> Result<Vec<T>, MapperError> {
        let mut items = Vec::new();
        while self.next().await? {
            let mut item = T::default();
            self.scan(&mut item)?;
            items.push(item);
        }
        Ok(items)
    }

    /// Release the cursor, then the statement when this result owns it.
    /// Calling it again has no effect.
    pub async fn close(&mut self) -> Result<(), MapperError> {
        self.release(true).await
    }

    async fn release(&mut self, close_statement: bool) -> Result<(), MapperError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current = None;

        let rows = self.rows.close().await;
        let statement = match self.statement.take() {
            Some(statement) if close_statement => statement.close().await,
            _ => Ok(()),
        };
        rows?;
        statement?;
        Ok(())
    }
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("columns", &self.columns)
            .field("owns_statement", &self.statement.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for QueryResult {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                columns = ?self.columns,
                "QueryResult dropped without calling close(); cursor may leak"
            );
        }
    }
}

/// A query expected to return a single row.
#[derive(Debug)]
pub struct QueryRowResult {
    result: QueryResult,
    in_transaction: bool,
}

impl QueryRowResult {
    pub(crate) fn new(result: QueryResult, in_transaction: bool) -> Self {
        Self {
            result,
            in_transaction,
        }
    }

    /// Scan the first row into `dest`.
    ///
    /// The cursor is released on every path. Its statement is released too,
    /// except inside a transaction, which owns its statements.
    ///
    /// # Errors
    ///
    /// Returns `ResultError::NoRows` when the query matched nothing.
    pub async fn scan<T: Scannable + ?Sized>(mut self, dest: &mut T) -> Result<(), MapperError> {
        let scanned = self.scan_first(dest).await;
        let released = self.result.release(!self.in_transaction).await;
        scanned?;
        released
    }

    /// Release the result without reading it. Inside a transaction the
    /// statement stays open for the transaction to close.
    pub async fn close(mut self) -> Result<(), MapperError> {
        self.result.release(!self.in_transaction).await
    }

    async fn scan_first<T: Scannable + ?Sized>(&mut self, dest: &mut T) -> Result<(), MapperError> {
        if !self.result.next().await? {
            return Err(ResultError::NoRows.into());
        }
        self.result.scan(dest)
    }
}
