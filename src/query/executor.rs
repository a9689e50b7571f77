//! Statement execution.
//!
//! Runs one statement through an [`ExecutionProxy`]: refine conditional
//! clauses, classify the parameters, bind them, then call the driver. Writes
//! made of several rows go to the batch executor.

use super::batch::execute_batch;
use super::results::{ExecResult, QueryResult, QueryRowResult};
use super::scan::FieldNameConvertStrategy;
use crate::binding::{
    bind_named, bind_positional, classify, presence_of, BoundQuery, CallMode, Classified, Param,
};
use crate::driver::ExecutionProxy;
use crate::error::{MapperError, ParamError, StatementError};
use crate::normalize::Normalizer;
use crate::statement::model::debug_params;
use crate::statement::{refine, Statement, StatementKind};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

/// Everything a statement call needs besides the statement itself.
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    pub proxy: &'a dyn ExecutionProxy,
    pub normalizer: &'a dyn Normalizer,
}

impl<'a> Invocation<'a> {
    pub fn new(proxy: &'a dyn ExecutionProxy, normalizer: &'a dyn Normalizer) -> Self {
        Self { proxy, normalizer }
    }

    /// Execute an insert or update.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::InvalidExecutionKind` for read statements.
    /// Every error carries the statement id.
    pub async fn execute(
        &self,
        stmt: &Statement,
        params: &[Param],
    ) -> Result<ExecResult, MapperError> {
        self.execute_inner(stmt, params)
            .await
            .map_err(|e| e.in_statement(stmt.id()))
    }

    /// Run a select and return its rows.
    ///
    /// # Errors
    ///
    /// Returns `StatementError::InvalidQueryKind` for write statements.
    pub async fn query(
        &self,
        stmt: &Statement,
        params: &[Param],
        strategy: Arc<dyn FieldNameConvertStrategy>,
    ) -> Result<QueryResult, MapperError> {
        self.query_inner(stmt, params, strategy)
            .await
            .map_err(|e| e.in_statement(stmt.id()))
    }

    /// Run a select expected to return a single row.
    pub async fn query_row(
        &self,
        stmt: &Statement,
        params: &[Param],
        strategy: Arc<dyn FieldNameConvertStrategy>,
    ) -> Result<QueryRowResult, MapperError> {
        let result = self.query(stmt, params, strategy).await?;
        Ok(QueryRowResult::new(result, self.proxy.is_transaction()))
    }

    /// Execute rows one by one against a single prepared statement.
    ///
    /// Rows carry no presence map, so conditional clauses are all dropped.
    pub async fn execute_rows(
        &self,
        stmt: &Statement,
        rows: &[Param],
    ) -> Result<ExecResult, MapperError> {
        self.execute_rows_inner(stmt, rows)
            .await
            .map_err(|e| e.in_statement(stmt.id()))
    }

    async fn execute_rows_inner(
        &self,
        stmt: &Statement,
        rows: &[Param],
    ) -> Result<ExecResult, MapperError> {
        if !stmt.kind().is_write() {
            return Err(StatementError::InvalidExecutionKind.into());
        }
        let refined = self.refined(stmt, &[])?;
        execute_batch(self.proxy, &refined, rows).await
    }

    async fn execute_inner(
        &self,
        stmt: &Statement,
        params: &[Param],
    ) -> Result<ExecResult, MapperError> {
        if !stmt.kind().is_write() {
            return Err(StatementError::InvalidExecutionKind.into());
        }

        let refined = self.refined(stmt, params)?;
        let stmt = &*refined;

        let bound = match classify(stmt, params, CallMode::Execute)? {
            Classified::Batch(rows) => return execute_batch(self.proxy, stmt, &rows).await,
            classified => self.bind(stmt, &classified)?,
        };

        self.debug(stmt, &bound);
        let start = Instant::now();
        let outcome = self.proxy.exec(&bound.sql, &bound.args).await?;
        self.proxy.record_execution(stmt.id(), start);

        Ok(ExecResult::from_outcome(
            outcome,
            stmt.kind() == StatementKind::Insert,
        ))
    }

    async fn query_inner(
        &self,
        stmt: &Statement,
        params: &[Param],
        strategy: Arc<dyn FieldNameConvertStrategy>,
    ) -> Result<QueryResult, MapperError> {
        if stmt.kind() != StatementKind::Select {
            return Err(StatementError::InvalidQueryKind.into());
        }

        let refined = self.refined(stmt, params)?;
        let stmt = &*refined;
        let classified = classify(stmt, params, CallMode::Query)?;
        let bound = self.bind(stmt, &classified)?;

        self.debug(stmt, &bound);
        let start = Instant::now();
        let cursor = self.proxy.query(&bound.sql, &bound.args).await;
        self.proxy.record_execution(stmt.id(), start);

        Ok(QueryResult::new(cursor?, strategy))
    }

    /// The statement with its conditional clauses resolved, or the statement
    /// itself when it has none.
    fn refined<'s>(
        &self,
        stmt: &'s Statement,
        params: &[Param],
    ) -> Result<Cow<'s, Statement>, MapperError> {
        if !stmt.has_condition() {
            return Ok(Cow::Borrowed(stmt));
        }
        let presence = presence_of(params)?;
        Ok(Cow::Owned(refine(stmt, presence.as_ref(), self.normalizer)?))
    }

    fn bind<'s>(
        &self,
        stmt: &'s Statement,
        classified: &Classified,
    ) -> Result<BoundQuery<'s>, MapperError> {
        match classified {
            Classified::Empty => Ok(BoundQuery {
                sql: Cow::Borrowed(stmt.resolved_text()),
                args: Vec::new(),
            }),
            Classified::Positional(values) => bind_positional(stmt, values, self.normalizer),
            Classified::Named { values, .. } => bind_named(stmt, values, self.normalizer),
            Classified::Batch(_) => {
                Err(ParamError::UnacceptableListElement { kind: "batch" }.into())
            }
        }
    }

    fn debug(&self, stmt: &Statement, bound: &BoundQuery<'_>) {
        if self.proxy.debug_enabled() {
            let params = debug_params(stmt.id(), &bound.args);
            self.proxy
                .debug_print(&format!("[{}] {}{}", stmt.id(), bound.sql, params));
        }
    }
}
