//! Transactions.
//!
//! A [`Transaction`] runs statements exactly like the mapper does, through
//! its own backend handle. Statements it prepares are cached by SQL text and
//! stay open until the transaction ends; cursors read inside it never close
//! them.

use super::bulk::Bulk;
use super::manager::Mapper;
use crate::binding::Param;
use crate::driver::{
    ExecOutcome, ExecutionProxy, PreparedHandle, QueryCursor, RowCursor, SqlRunner,
    TransactionBackend,
};
use crate::error::{DriverError, MapperError};
use crate::monitor::Debugger;
use crate::query::{ExecResult, Invocation, QueryResult, QueryRowResult};
use crate::types::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// An open transaction on a [`Mapper`].
///
/// Consume it with [`Transaction::commit`] or [`Transaction::rollback`].
/// Dropping it unfinished rolls the transaction back.
pub struct Transaction<'m> {
    mapper: &'m Mapper,
    backend: Option<Box<dyn TransactionBackend>>,
    prepared: Mutex<HashMap<String, Arc<dyn PreparedHandle>>>,
}

impl<'m> Transaction<'m> {
    pub(crate) fn new(mapper: &'m Mapper, backend: Box<dyn TransactionBackend>) -> Self {
        Self {
            mapper,
            backend: Some(backend),
            prepared: Mutex::new(HashMap::new()),
        }
    }

    /// Execute an insert or update inside the transaction.
    pub async fn execute(&self, id: &str, params: &[Param]) -> Result<ExecResult, MapperError> {
        let stmt = self.mapper.find(id)?;
        self.invocation().execute(&stmt, params).await
    }

    /// Run a select inside the transaction.
    pub async fn query(&self, id: &str, params: &[Param]) -> Result<QueryResult, MapperError> {
        let stmt = self.mapper.find(id)?;
        self.invocation()
            .query(&stmt, params, self.mapper.strategy())
            .await
    }

    /// Run a select expected to return one row.
    pub async fn query_row(
        &self,
        id: &str,
        params: &[Param],
    ) -> Result<QueryRowResult, MapperError> {
        let stmt = self.mapper.find(id)?;
        self.invocation()
            .query_row(&stmt, params, self.mapper.strategy())
            .await
    }

    /// Start collecting rows for a batch of `id` inside the transaction.
    pub fn create_bulk(&self, id: &str) -> Result<Bulk<'_>, MapperError> {
        let stmt = self.mapper.find(id)?;
        Bulk::new(self, self.mapper.context().normalizer(), stmt)
    }

    /// Number of statements prepared so far.
    pub async fn prepared_count(&self) -> usize {
        self.prepared.lock().await.len()
    }

    /// Commit and release every statement prepared in the transaction.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the backend rejects the commit.
    pub async fn commit(mut self) -> Result<(), MapperError> {
        self.release_statements().await;
        match self.backend.take() {
            Some(backend) => Ok(backend.commit().await?),
            None => Ok(()),
        }
    }

    /// Roll back and release every statement prepared in the transaction.
    pub async fn rollback(mut self) -> Result<(), MapperError> {
        self.release_statements().await;
        match self.backend.take() {
            Some(backend) => Ok(backend.rollback().await?),
            None => Ok(()),
        }
    }

    async fn release_statements(&self) {
        let prepared: Vec<_> = self.prepared.lock().await.drain().collect();
        for (sql, handle) in prepared {
            if let Err(e) = handle.close().await {
                tracing::warn!(sql = %sql, error = %e, "failed to close transaction statement");
            }
        }
    }

    fn runner(&self) -> Result<&dyn TransactionBackend, DriverError> {
        self.backend
            .as_deref()
            .ok_or_else(|| DriverError::Failed("transaction already finished".to_string()))
    }

    /// Cached statement for `sql`, prepared on first use.
    async fn cached(&self, sql: &str) -> Result<Arc<dyn PreparedHandle>, DriverError> {
        let mut prepared = self.prepared.lock().await;
        if let Some(handle) = prepared.get(sql) {
            return Ok(Arc::clone(handle));
        }

        let handle: Arc<dyn PreparedHandle> = Arc::from(self.runner()?.prepare(sql).await?);
        prepared.insert(sql.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    fn invocation(&self) -> Invocation<'_> {
        Invocation::new(self, self.mapper.context().normalizer())
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("finished", &self.backend.is_none())
            .finish_non_exhaustive()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.backend.is_some() {
            tracing::warn!("Transaction dropped without commit() or rollback(); rolling back");
        }
    }
}

impl Debugger for Transaction<'_> {
    fn debug_enabled(&self) -> bool {
        self.mapper.debugger().debug_enabled()
    }

    fn debug_print(&self, message: &str) {
        self.mapper.debugger().debug_print(message);
    }

    fn record_execution(&self, id: &str, start: Instant) {
        self.mapper.debugger().record_execution(id, start);
    }
}

#[async_trait]
impl<'m> ExecutionProxy for Transaction<'m> {
    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.runner()?.exec(sql, args).await
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<QueryCursor, DriverError> {
        if args.is_empty() {
            let rows = self.runner()?.query(sql, args).await?;
            return Ok(QueryCursor::new(rows, None));
        }

        let handle = self.cached(sql).await?;
        let rows = handle.query(args).await?;
        Ok(QueryCursor::new(rows, None))
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedHandle>, DriverError> {
        let handle = self.cached(sql).await?;
        Ok(Box::new(TransactionStatement { handle }))
    }

    fn is_transaction(&self) -> bool {
        true
    }
}

/// Statement handed out by a transaction. Closing it is a no-op; the
/// transaction closes the underlying statement when it ends.
struct TransactionStatement {
    handle: Arc<dyn PreparedHandle>,
}

#[async_trait]
impl PreparedHandle for TransactionStatement {
    async fn exec(&self, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.handle.exec(args).await
    }

    async fn query(&self, args: &[Value]) -> Result<Box<dyn RowCursor>, DriverError> {
        self.handle.query(args).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
