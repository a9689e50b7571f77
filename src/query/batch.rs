//! Batch execution over one prepared statement.
//!
//! A batch runs in three phases: every row is validated, one statement is
//! prepared, then rows execute in order. A lost connection restarts the
//! phases once on the rows that have not run yet.

use super::results::ExecResult;
use crate::binding::{bind_row, row_shape, Param};
use crate::driver::{ExecutionProxy, PreparedHandle};
use crate::error::{BindError, MapperError, ParamError, ResultError};
use crate::statement::model::debug_params;
use crate::statement::{Statement, StatementKind};
use std::time::Instant;

/// Progress of one pass over a batch.
#[derive(Debug)]
struct BatchRun {
    executed: usize,
    result: ExecResult,
    error: Option<MapperError>,
}

impl BatchRun {
    fn failed(executed: usize, result: ExecResult, error: MapperError) -> Self {
        Self {
            executed,
            result,
            error: Some(error),
        }
    }
}

/// Execute every row of `rows` against `stmt`.
///
/// # Errors
///
/// Returns `MapperError::Batch` holding the failing row index and the
/// result of the rows applied before it.
pub async fn execute_batch(
    proxy: &dyn ExecutionProxy,
    stmt: &Statement,
    rows: &[Param],
) -> Result<ExecResult, MapperError> {
    let first = run_batch(proxy, stmt, rows).await;
    let Some(error) = first.error else {
        return Ok(first.result);
    };

    if !error.is_bad_connection() {
        return Err(batch_error(stmt, first.executed, first.result, error));
    }

    tracing::warn!(
        statement = stmt.id(),
        row = first.executed,
        remaining = rows.len() - first.executed,
        "bad connection during batch, retrying remaining rows"
    );

    let mut merged = first.result;
    let retry = run_batch(proxy, stmt, &rows[first.executed..]).await;
    match retry.error {
        None => {
            merged.merge(retry.result);
            Ok(merged)
        }
        Some(error) => Err(batch_error(
            stmt,
            first.executed + retry.executed,
            merged,
            error,
        )),
    }
}

fn batch_error(
    stmt: &Statement,
    row: usize,
    partial: ExecResult,
    source: MapperError,
) -> MapperError {
    MapperError::Batch {
        id: stmt.id().to_string(),
        row,
        partial,
        source: Box::new(source),
    }
}

async fn run_batch(proxy: &dyn ExecutionProxy, stmt: &Statement, rows: &[Param]) -> BatchRun {
    if let Err((row, error)) = validate(stmt, rows) {
        return BatchRun::failed(row, ExecResult::default(), error);
    }

    let handle = match proxy.prepare(stmt.resolved_text()).await {
        Ok(handle) => handle,
        Err(e) => return BatchRun::failed(0, ExecResult::default(), e.into()),
    };

    if proxy.debug_enabled() {
        proxy.debug_print(&format!("[{}] {}", stmt.id(), stmt.resolved_text()));
    }

    let run = iterate(proxy, stmt, handle.as_ref(), rows).await;

    if let Err(e) = handle.close().await {
        tracing::warn!(statement = stmt.id(), error = %e, "failed to close batch statement");
    }
    run
}

/// Every row must share the first row's shape and carry enough values.
fn validate(stmt: &Statement, rows: &[Param]) -> Result<(), (usize, MapperError)> {
    let Some(expected) = rows.first().and_then(row_shape) else {
        return Ok(());
    };
    let defined = stmt.columns().len();

    for (index, row) in rows.iter().enumerate() {
        let found = row_shape(row).unwrap_or_else(|| row.kind_name());
        if found != expected {
            return Err((index, ParamError::BatchShapeMismatch { index, expected, found }.into()));
        }

        let supplied = row_width(row);
        if defined > supplied {
            return Err((
                index,
                BindError::CountMismatch {
                    defined,
                    args: supplied,
                }
                .into(),
            ));
        }
    }
    Ok(())
}

fn row_width(row: &Param) -> usize {
    match row {
        Param::Optional(Some(inner)) => row_width(inner),
        Param::Sequence(items) => items.len(),
        Param::Mapping(entries) => entries.len(),
        Param::Record(fields) => fields.len(),
        _ => 0,
    }
}

async fn iterate(
    proxy: &dyn ExecutionProxy,
    stmt: &Statement,
    handle: &dyn PreparedHandle,
    rows: &[Param],
) -> BatchRun {
    let mut result = ExecResult::default();
    let capture_id = stmt.kind() == StatementKind::Insert;

    for (index, row) in rows.iter().enumerate() {
        let args = match bind_row(stmt, row) {
            Ok(args) => args,
            Err(e) => return BatchRun::failed(index, result, e),
        };

        if proxy.debug_enabled() {
            proxy.debug_print(&debug_params(stmt.id(), &args));
        }

        let start = Instant::now();
        let outcome = match handle.exec(&args).await {
            Ok(outcome) => outcome,
            Err(e) => return BatchRun::failed(index, result, e.into()),
        };
        proxy.record_execution(stmt.id(), start);

        let insert_id = if capture_id {
            match outcome.last_insert_id {
                Some(id) => Some(id),
                None => {
                    let error = ResultError::MissingInsertId {
                        message: "driver reported no generated id".to_string(),
                    };
                    result.push_row(outcome.rows_affected, None);
                    return BatchRun::failed(index, result, error.into());
                }
            }
        } else {
            None
        };
        result.push_row(outcome.rows_affected, insert_id);
    }

    BatchRun {
        executed: rows.len(),
        result,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::ToParam;
    use crate::driver::{ExecOutcome, QueryCursor, RowCursor};
    use crate::error::DriverError;
    use crate::monitor::Debugger;
    use crate::statement::ColumnBinding;
    use crate::types::Value;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::Sequence;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    mock! {
        pub Proxy {}

        impl Debugger for Proxy {
            fn debug_enabled(&self) -> bool;
            fn debug_print(&self, message: &str);
            fn record_execution(&self, id: &str, start: Instant);
        }

        #[async_trait]
        impl ExecutionProxy for Proxy {
            async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome, DriverError>;
            async fn query(&self, sql: &str, args: &[Value]) -> Result<QueryCursor, DriverError>;
            async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedHandle>, DriverError>;
            fn is_transaction(&self) -> bool;
        }
    }

    mock! {
        pub Prepared {}

        #[async_trait]
        impl PreparedHandle for Prepared {
            async fn exec(&self, args: &[Value]) -> Result<ExecOutcome, DriverError>;
            async fn query(&self, args: &[Value]) -> Result<Box<dyn RowCursor>, DriverError>;
            async fn close(&self) -> Result<(), DriverError>;
        }
    }

    fn insert_stmt() -> Statement {
        let mut stmt = Statement::new("insertUser", StatementKind::Insert, "");
        stmt.columns = vec![ColumnBinding::new("name", 1), ColumnBinding::new("age", 2)];
        stmt.resolved_text = "INSERT INTO users (name, age) VALUES (?, ?)".to_string();
        stmt
    }

    fn quiet_proxy() -> MockProxy {
        let mut proxy = MockProxy::new();
        proxy.expect_debug_enabled().return_const(false);
        proxy.expect_record_execution().return_const(());
        proxy
    }

    fn rows(n: i64) -> Vec<Param> {
        (0..n)
            .map(|i| Param::Sequence(crate::params![format!("user{i}"), 20 + i]))
            .collect()
    }

    /// A prepared statement whose ids continue from `next_id`; `fail_at`
    /// makes that call fail with `error`.
    fn prepared(
        next_id: Arc<AtomicUsize>,
        fail_at: Option<(usize, DriverError)>,
        closes: Arc<AtomicUsize>,
    ) -> Box<dyn PreparedHandle> {
        let mut prepared = MockPrepared::new();
        let calls = AtomicUsize::new(0);
        prepared.expect_exec().returning(move |_| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if let Some((at, error)) = &fail_at {
                if *at == call {
                    return Err(error.clone());
                }
            }
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            Ok(ExecOutcome::new(1, Some(id as i64)))
        });
        prepared.expect_close().returning(move || {
            closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Box::new(prepared)
    }

    #[tokio::test]
    async fn test_batch_collects_ids_in_order() {
        let ids = Arc::new(AtomicUsize::new(1));
        let closes = Arc::new(AtomicUsize::new(0));

        let mut proxy = quiet_proxy();
        let (ids_c, closes_c) = (Arc::clone(&ids), Arc::clone(&closes));
        proxy
            .expect_prepare()
            .times(1)
            .returning(move |_| Ok(prepared(Arc::clone(&ids_c), None, Arc::clone(&closes_c))));

        let result = execute_batch(&proxy, &insert_stmt(), &rows(3)).await.unwrap();
        assert_eq!(result.insert_ids(), &[1, 2, 3]);
        assert_eq!(result.rows_affected(), 3);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_result() {
        let ids = Arc::new(AtomicUsize::new(1));
        let closes = Arc::new(AtomicUsize::new(0));

        let mut proxy = quiet_proxy();
        let (ids_c, closes_c) = (Arc::clone(&ids), Arc::clone(&closes));
        proxy.expect_prepare().times(1).returning(move |_| {
            Ok(prepared(
                Arc::clone(&ids_c),
                Some((2, DriverError::Failed("constraint".to_string()))),
                Arc::clone(&closes_c),
            ))
        });

        let err = execute_batch(&proxy, &insert_stmt(), &rows(4)).await.unwrap_err();
        assert_eq!(err.failed_row(), Some(2));
        assert_eq!(err.partial_result().unwrap().insert_ids(), &[1, 2]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bad_connection_retries_suffix_once() {
        let ids = Arc::new(AtomicUsize::new(1));
        let closes = Arc::new(AtomicUsize::new(0));

        let mut proxy = quiet_proxy();
        let mut seq = Sequence::new();
        let (ids_a, closes_a) = (Arc::clone(&ids), Arc::clone(&closes));
        proxy
            .expect_prepare()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| {
                Ok(prepared(
                    Arc::clone(&ids_a),
                    Some((1, DriverError::BadConnection)),
                    Arc::clone(&closes_a),
                ))
            });
        let (ids_b, closes_b) = (Arc::clone(&ids), Arc::clone(&closes));
        proxy
            .expect_prepare()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(prepared(Arc::clone(&ids_b), None, Arc::clone(&closes_b))));

        let result = execute_batch(&proxy, &insert_stmt(), &rows(3)).await.unwrap();
        assert_eq!(result.insert_ids(), &[1, 2, 3]);
        assert_eq!(result.rows_affected(), 3);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_bad_connection_is_surfaced() {
        let ids = Arc::new(AtomicUsize::new(1));
        let closes = Arc::new(AtomicUsize::new(0));

        let mut proxy = quiet_proxy();
        let (ids_c, closes_c) = (Arc::clone(&ids), Arc::clone(&closes));
        proxy.expect_prepare().times(2).returning(move |_| {
            Ok(prepared(
                Arc::clone(&ids_c),
                Some((1, DriverError::BadConnection)),
                Arc::clone(&closes_c),
            ))
        });

        let err = execute_batch(&proxy, &insert_stmt(), &rows(4)).await.unwrap_err();
        assert!(err.is_bad_connection());
        // first pass applied row 0, the retry applied row 1 and failed on row 2
        assert_eq!(err.failed_row(), Some(2));
        assert_eq!(err.partial_result().unwrap().insert_ids(), &[1]);
    }

    #[tokio::test]
    async fn test_validation_fails_before_prepare() {
        let mut proxy = quiet_proxy();
        proxy.expect_prepare().times(0);

        let mut mixed = rows(2);
        mixed.push(Param::Record(vec![("name".to_string(), "x".to_param())]));
        let err = execute_batch(&proxy, &insert_stmt(), &mixed).await.unwrap_err();
        assert_eq!(err.failed_row(), Some(2));
        assert!(matches!(
            err.root(),
            MapperError::Param(ParamError::BatchShapeMismatch { index: 2, .. })
        ));

        let short = vec![Param::Sequence(crate::params!["only name"])];
        let err = execute_batch(&proxy, &insert_stmt(), &short).await.unwrap_err();
        assert!(matches!(
            err.root(),
            MapperError::Bind(BindError::CountMismatch { defined: 2, args: 1 })
        ));
    }

    #[tokio::test]
    async fn test_missing_insert_id_is_error() {
        let mut proxy = quiet_proxy();
        proxy.expect_prepare().returning(|_| {
            let mut prepared = MockPrepared::new();
            prepared
                .expect_exec()
                .returning(|_| Ok(ExecOutcome::new(1, None)));
            prepared.expect_close().returning(|| Ok(()));
            Ok(Box::new(prepared) as Box<dyn PreparedHandle>)
        });

        let err = execute_batch(&proxy, &insert_stmt(), &rows(2)).await.unwrap_err();
        assert_eq!(err.failed_row(), Some(0));
        assert!(err.to_string().contains("fail to get last inserted id"));
    }
}
