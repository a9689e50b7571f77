//! Row accumulator for batch execution.

use crate::binding::{Param, ToParam};
use crate::driver::ExecutionProxy;
use crate::error::{MapperError, StatementError};
use crate::normalize::Normalizer;
use crate::query::{ExecResult, Invocation};
use crate::statement::Statement;
use std::fmt;
use std::sync::Arc;

/// Rows collected for one write statement, executed together over a single
/// prepared statement.
///
/// Rows are mappings, records or lists. A successful [`Bulk::execute`]
/// empties the bulk; a failed one keeps the rows so the caller can inspect
/// or resubmit them.
pub struct Bulk<'p> {
    proxy: &'p dyn ExecutionProxy,
    normalizer: &'p dyn Normalizer,
    stmt: Arc<Statement>,
    rows: Vec<Param>,
}

impl<'p> Bulk<'p> {
    pub(crate) fn new(
        proxy: &'p dyn ExecutionProxy,
        normalizer: &'p dyn Normalizer,
        stmt: Arc<Statement>,
    ) -> Result<Self, MapperError> {
        if !stmt.kind().is_write() {
            let err = MapperError::from(StatementError::InvalidExecutionKind);
            return Err(err.in_statement(stmt.id()));
        }
        Ok(Self {
            proxy,
            normalizer,
            stmt,
            rows: Vec::new(),
        })
    }

    pub fn statement(&self) -> &Statement {
        &self.stmt
    }

    /// Append one row.
    pub fn add<T: ToParam + ?Sized>(&mut self, row: &T) -> &mut Self {
        self.rows.push(row.to_param());
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Execute every collected row in order.
    ///
    /// # Errors
    ///
    /// Returns `MapperError::Batch` with the failing row and the partial
    /// result when a row fails.
    pub async fn execute(&mut self) -> Result<ExecResult, MapperError> {
        if self.rows.is_empty() {
            return Ok(ExecResult::default());
        }

        let result = Invocation::new(self.proxy, self.normalizer)
            .execute_rows(&self.stmt, &self.rows)
            .await?;
        self.rows.clear();
        Ok(result)
    }
}

impl fmt::Debug for Bulk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulk")
            .field("statement", &self.stmt.id())
            .field("rows", &self.rows.len())
            .finish_non_exhaustive()
    }
}
