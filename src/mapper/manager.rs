//! The statement mapper.
//!
//! A [`Mapper`] is built once from a preference, a backend and every
//! statement declaration. After that its registry is read-only, so callers
//! on any task only ever see complete registrations.

use super::bulk::Bulk;
use super::transaction::Transaction;
use crate::binding::Param;
use crate::config::MapperPreference;
use crate::driver::{Backend, DirectProxy};
use crate::error::{ConfigError, MapperError};
use crate::monitor::{Debugger, ExecutionRecorder, ExecutionStats, MapperDebugger};
use crate::normalize::{normalizer_for, Normalizer};
use crate::query::{
    ExecResult, FieldNameConvertStrategy, Invocation, QueryResult, QueryRowResult,
};
use crate::statement::{MapperContext, Statement, StatementBuilder, StatementRegistry};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builder for a [`Mapper`].
///
/// # Example
///
/// ```no_run
/// use stmtmap::config::MapperPreference;
/// use stmtmap::driver::Backend;
/// use stmtmap::mapper::MapperBuilder;
/// use stmtmap::statement::{StatementBuilder, StatementKind};
/// use std::sync::Arc;
///
/// # async fn example(backend: Arc<dyn Backend>) -> Result<(), Box<dyn std::error::Error>> {
/// let mapper = MapperBuilder::new("mysql://app@localhost/shop".parse()?)
///     .backend(backend)
///     .statement(
///         StatementBuilder::new("findByAge", StatementKind::Select)
///             .sql("SELECT id, name FROM users WHERE age > :age"),
///     )
///     .build()?;
///
/// let mut count = 0i64;
/// mapper
///     .query_row("SELECT COUNT(*) FROM users", &[])
///     .await?
///     .scan(&mut count)
///     .await?;
/// mapper.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct MapperBuilder {
    preference: MapperPreference,
    backend: Option<Arc<dyn Backend>>,
    normalizer: Option<Arc<dyn Normalizer>>,
    statements: Vec<StatementBuilder>,
}

impl MapperBuilder {
    pub fn new(preference: MapperPreference) -> Self {
        Self {
            preference,
            backend: None,
            normalizer: None,
            statements: Vec::new(),
        }
    }

    /// Set the database the mapper executes against.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use `normalizer` instead of the one chosen by driver name.
    pub fn normalizer(mut self, normalizer: Arc<dyn Normalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Declare one statement.
    pub fn statement(mut self, statement: StatementBuilder) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn statements(mut self, statements: impl IntoIterator<Item = StatementBuilder>) -> Self {
        self.statements.extend(statements);
        self
    }

    /// Build every statement and register it.
    ///
    /// Nothing is returned unless every statement builds and no two ids
    /// collide.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when no backend is set, `StatementError` for an
    /// unknown driver, a malformed statement or a duplicate id.
    pub fn build(self) -> Result<Mapper, MapperError> {
        let backend = self.backend.ok_or_else(|| ConfigError::InvalidParameter {
            parameter: "backend".to_string(),
            message: "A backend is required".to_string(),
        })?;

        let normalizer = match self.normalizer {
            Some(normalizer) => normalizer,
            None => normalizer_for(&self.preference.driver)?,
        };
        let context = MapperContext::new(normalizer);

        let mut registry = StatementRegistry::new();
        for statement in self.statements {
            let statement = statement.build(&context)?;
            registry.register(statement)?;
        }

        let recorder = if self.preference.record_executions {
            if tokio::runtime::Handle::try_current().is_err() {
                return Err(ConfigError::InvalidParameter {
                    parameter: "record_executions".to_string(),
                    message: "Recording executions requires a running tokio runtime".to_string(),
                }
                .into());
            }
            Some(Arc::new(ExecutionRecorder::spawn(
                self.preference.record_queue_size,
            )))
        } else {
            None
        };

        let debugger = Arc::new(MapperDebugger::new(self.preference.debug, recorder));
        let proxy = DirectProxy::new(backend, Arc::clone(&debugger) as Arc<dyn Debugger>);
        let strategy = self.preference.field_strategy();

        tracing::info!(
            driver = %self.preference.driver,
            statements = registry.len(),
            "mapper ready"
        );

        Ok(Mapper {
            preference: self.preference,
            context,
            registry,
            proxy,
            debugger,
            strategy,
        })
    }
}

impl fmt::Debug for MapperBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperBuilder")
            .field("preference", &self.preference)
            .field("has_backend", &self.backend.is_some())
            .field("statements", &self.statements.len())
            .finish()
    }
}

/// Registered statements bound to a backend.
pub struct Mapper {
    preference: MapperPreference,
    context: MapperContext,
    registry: StatementRegistry,
    proxy: DirectProxy,
    debugger: Arc<MapperDebugger>,
    strategy: Arc<dyn FieldNameConvertStrategy>,
}

impl Mapper {
    pub fn builder(preference: MapperPreference) -> MapperBuilder {
        MapperBuilder::new(preference)
    }

    pub fn preference(&self) -> &MapperPreference {
        &self.preference
    }

    /// Number of registered statements.
    pub fn statement_count(&self) -> usize {
        self.registry.len()
    }

    /// Connection bound from the preference; 0 means unlimited.
    pub fn max_open_conns(&self) -> usize {
        self.preference.max_open_conns
    }

    /// Look up a statement id, case-insensitively. Raw SQL text is accepted
    /// in place of an id.
    pub fn find(&self, id: &str) -> Result<Arc<Statement>, MapperError> {
        Ok(self.registry.find(id, &self.context)?)
    }

    /// Execute an insert or update.
    ///
    /// # Arguments
    ///
    /// * `id` - Statement id or raw SQL
    /// * `params` - Scalars bound in order, one mapping or record bound by
    ///   name, or a list of rows executed as a batch
    ///
    /// # Errors
    ///
    /// A failed batch returns `MapperError::Batch`; the rows applied before
    /// the failure are in [`MapperError::partial_result`].
    pub async fn execute(&self, id: &str, params: &[Param]) -> Result<ExecResult, MapperError> {
        let stmt = self.find(id)?;
        self.invocation().execute(&stmt, params).await
    }

    /// Run a select and return a cursor over its rows.
    pub async fn query(&self, id: &str, params: &[Param]) -> Result<QueryResult, MapperError> {
        let stmt = self.find(id)?;
        self.invocation()
            .query(&stmt, params, Arc::clone(&self.strategy))
            .await
    }

    /// Run a select expected to return one row.
    pub async fn query_row(
        &self,
        id: &str,
        params: &[Param],
    ) -> Result<QueryRowResult, MapperError> {
        let stmt = self.find(id)?;
        self.invocation()
            .query_row(&stmt, params, Arc::clone(&self.strategy))
            .await
    }

    /// Start collecting rows for a batch of `id`.
    pub fn create_bulk(&self, id: &str) -> Result<Bulk<'_>, MapperError> {
        let stmt = self.find(id)?;
        Bulk::new(&self.proxy, self.context.normalizer(), stmt)
    }

    /// Start a transaction. It must end with `commit` or `rollback`.
    pub async fn begin(&self) -> Result<Transaction<'_>, MapperError> {
        let backend = self.proxy.backend().begin().await?;
        Ok(Transaction::new(self, backend))
    }

    /// Run `work` in a transaction: commit when it succeeds, roll back when
    /// it fails.
    ///
    /// ```no_run
    /// # use stmtmap::mapper::Mapper;
    /// # use stmtmap::params;
    /// # async fn example(mapper: &Mapper) -> Result<(), stmtmap::MapperError> {
    /// let moved = mapper
    ///     .in_transaction(|tx| {
    ///         Box::pin(async move {
    ///             tx.execute("debitAccount", &params![1, 100]).await?;
    ///             tx.execute("creditAccount", &params![2, 100]).await
    ///         })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn in_transaction<'m, T, F>(&'m self, work: F) -> Result<T, MapperError>
    where
        F: for<'t> FnOnce(&'t Transaction<'m>) -> BoxFuture<'t, Result<T, MapperError>>,
    {
        let tx = self.begin().await?;
        let outcome = work(&tx).await;
        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback after failed transaction failed");
                }
                Err(e)
            }
        }
    }

    /// Aggregated timings per statement id; empty unless recording is on.
    pub fn execution_stats(&self) -> HashMap<String, ExecutionStats> {
        self.debugger
            .recorder()
            .map(|recorder| recorder.snapshot())
            .unwrap_or_default()
    }

    /// Stop the execution recorder, then close the backend.
    pub async fn close(&self) -> Result<(), MapperError> {
        if let Some(recorder) = self.debugger.recorder() {
            recorder.shutdown().await;
        }
        self.proxy.backend().close().await?;
        Ok(())
    }

    pub(crate) fn context(&self) -> &MapperContext {
        &self.context
    }

    pub(crate) fn debugger(&self) -> &MapperDebugger {
        &self.debugger
    }

    pub(crate) fn strategy(&self) -> Arc<dyn FieldNameConvertStrategy> {
        Arc::clone(&self.strategy)
    }

    fn invocation(&self) -> Invocation<'_> {
        Invocation::new(&self.proxy, self.context.normalizer())
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("preference", &self.preference)
            .field("statements", &self.registry.len())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}
