//! Execution proxies.
//!
//! The executor runs every statement through an [`ExecutionProxy`]. Outside a
//! transaction that is a [`DirectProxy`] over the backend; inside one it is
//! the transaction itself.

use super::protocol::{Backend, ExecOutcome, PreparedHandle, QueryCursor, SqlRunner};
use crate::error::DriverError;
use crate::monitor::Debugger;
use crate::types::Value;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Where statements are executed.
#[async_trait]
pub trait ExecutionProxy: Debugger {
    /// Execute a write statement.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the driver call fails.
    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome, DriverError>;

    /// Run a read statement.
    ///
    /// The returned cursor carries its prepared statement only when the
    /// caller is responsible for closing it.
    async fn query(&self, sql: &str, args: &[Value]) -> Result<QueryCursor, DriverError>;

    /// Prepare a statement for a batch.
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedHandle>, DriverError>;

    /// True inside a transaction.
    fn is_transaction(&self) -> bool;
}

/// Proxy executing straight against the backend.
pub struct DirectProxy {
    backend: Arc<dyn Backend>,
    debugger: Arc<dyn Debugger>,
}

impl DirectProxy {
    pub fn new(backend: Arc<dyn Backend>, debugger: Arc<dyn Debugger>) -> Self {
        Self { backend, debugger }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

impl fmt::Debug for DirectProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectProxy")
            .field("debug", &self.debugger.debug_enabled())
            .finish_non_exhaustive()
    }
}

impl Debugger for DirectProxy {
    fn debug_enabled(&self) -> bool {
        self.debugger.debug_enabled()
    }

    fn debug_print(&self, message: &str) {
        self.debugger.debug_print(message);
    }

    fn record_execution(&self, id: &str, start: Instant) {
        self.debugger.record_execution(id, start);
    }
}

#[async_trait]
impl ExecutionProxy for DirectProxy {
    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.backend.exec(sql, args).await
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<QueryCursor, DriverError> {
        if args.is_empty() {
            let rows = self.backend.query(sql, args).await?;
            return Ok(QueryCursor::new(rows, None));
        }

        let statement = self.backend.prepare(sql).await?;
        match statement.query(args).await {
            Ok(rows) => Ok(QueryCursor::new(rows, Some(statement))),
            Err(e) => {
                if let Err(close_err) = statement.close().await {
                    tracing::warn!(error = %close_err, "failed to close statement");
                }
                Err(e)
            }
        }
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedHandle>, DriverError> {
        self.backend.prepare(sql).await
    }

    fn is_transaction(&self) -> bool {
        false
    }
}
