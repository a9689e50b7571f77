//! Common test utilities for stmtmap integration tests.
//!
//! # In-memory backend
//!
//! [`FakeBackend`] implements the driver traits without a database. It
//! records every call with its SQL text and arguments, hands out
//! auto-incremented insert ids, serves canned rows for queries and counts
//! the prepared statements and cursors left open, so tests can assert that
//! the mapper releases everything it acquires.
//!
//! Failures are injected per exec call: `fail_exec_at(3, ..)` makes the
//! third exec, direct or prepared, return the given error.
//!
//! # Running
//!
//! ```bash
//! cargo test --test mapper_tests
//! RUST_LOG=stmtmap=debug cargo test --test batch_tests -- --nocapture
//! ```

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use stmtmap::driver::{
    Backend, ExecOutcome, PreparedHandle, RowCursor, SqlRunner, TransactionBackend,
};
use stmtmap::{DriverError, Mapper, MapperPreference, StatementBuilder, Value};

// ============================================================================
// Recorded calls
// ============================================================================

/// How the backend was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Exec,
    Query,
    Prepare,
    PreparedExec,
    PreparedQuery,
}

/// One call seen by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub kind: CallKind,
    pub sql: String,
    pub args: Vec<Value>,
    pub in_transaction: bool,
}

// ============================================================================
// Shared state
// ============================================================================

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    next_id: i64,
    no_insert_ids: bool,
    exec_count: usize,
    exec_faults: HashMap<usize, DriverError>,
    canned: Vec<(String, Vec<String>, Vec<Vec<Value>>)>,
    open_statements: usize,
    open_cursors: usize,
    prepared_total: usize,
    begun: usize,
    commits: usize,
    rollbacks: usize,
    closed: bool,
}

/// In-memory backend shared between the mapper and the test.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Serve `columns` and `rows` to every query whose SQL contains `fragment`.
    pub fn on_query(&self, fragment: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        self.lock().canned.push((
            fragment.to_string(),
            columns.iter().map(|c| (*c).to_string()).collect(),
            rows,
        ));
    }

    /// Make exec call number `n` (1-based, direct and prepared alike) fail.
    pub fn fail_exec_at(&self, n: usize, error: DriverError) {
        self.lock().exec_faults.insert(n, error);
    }

    /// Stop reporting generated ids for inserts.
    pub fn without_insert_ids(&self) {
        self.lock().no_insert_ids = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls of one kind, in order.
    pub fn calls_of(&self, kind: CallKind) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect()
    }

    pub fn open_statements(&self) -> usize {
        self.lock().open_statements
    }

    pub fn open_cursors(&self) -> usize {
        self.lock().open_cursors
    }

    pub fn prepared_total(&self) -> usize {
        self.lock().prepared_total
    }

    pub fn begun(&self) -> usize {
        self.lock().begun
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn record(&self, kind: CallKind, sql: &str, args: &[Value], in_transaction: bool) {
        self.lock().calls.push(Call {
            kind,
            sql: sql.to_string(),
            args: args.to_vec(),
            in_transaction,
        });
    }

    fn run_exec(
        &self,
        kind: CallKind,
        sql: &str,
        args: &[Value],
        in_transaction: bool,
    ) -> Result<ExecOutcome, DriverError> {
        self.record(kind, sql, args, in_transaction);
        let mut state = self.lock();
        state.exec_count += 1;
        let n = state.exec_count;
        if let Some(error) = state.exec_faults.remove(&n) {
            return Err(error);
        }

        let is_insert = sql.trim_start().to_ascii_uppercase().starts_with("INSERT");
        let insert_id = if is_insert && !state.no_insert_ids {
            state.next_id += 1;
            Some(state.next_id)
        } else {
            None
        };
        Ok(ExecOutcome::new(1, insert_id))
    }

    fn run_query(
        &self,
        kind: CallKind,
        sql: &str,
        args: &[Value],
        in_transaction: bool,
    ) -> Box<dyn RowCursor> {
        self.record(kind, sql, args, in_transaction);
        let mut state = self.lock();
        let (columns, rows) = state
            .canned
            .iter()
            .find(|(fragment, _, _)| sql.contains(fragment.as_str()))
            .map(|(_, columns, rows)| (columns.clone(), rows.clone()))
            .unwrap_or_default();
        state.open_cursors += 1;
        drop(state);

        Box::new(FakeCursor {
            backend: self.clone(),
            columns,
            rows: rows.into(),
            closed: false,
        })
    }

    fn run_prepare(&self, sql: &str, in_transaction: bool) -> Box<dyn PreparedHandle> {
        self.record(CallKind::Prepare, sql, &[], in_transaction);
        let mut state = self.lock();
        state.open_statements += 1;
        state.prepared_total += 1;
        drop(state);

        Box::new(FakeStatement {
            backend: self.clone(),
            sql: sql.to_string(),
            in_transaction,
            closed: Mutex::new(false),
        })
    }
}

#[async_trait]
impl SqlRunner for FakeBackend {
    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.run_exec(CallKind::Exec, sql, args, false)
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn RowCursor>, DriverError> {
        Ok(self.run_query(CallKind::Query, sql, args, false))
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedHandle>, DriverError> {
        Ok(self.run_prepare(sql, false))
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn begin(&self) -> Result<Box<dyn TransactionBackend>, DriverError> {
        self.lock().begun += 1;
        Ok(Box::new(FakeTransaction {
            backend: self.clone(),
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.lock().closed = true;
        Ok(())
    }
}

// ============================================================================
// Transactions, statements and cursors
// ============================================================================

#[derive(Debug)]
pub struct FakeTransaction {
    backend: FakeBackend,
}

#[async_trait]
impl SqlRunner for FakeTransaction {
    async fn exec(&self, sql: &str, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.backend.run_exec(CallKind::Exec, sql, args, true)
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Box<dyn RowCursor>, DriverError> {
        Ok(self.backend.run_query(CallKind::Query, sql, args, true))
    }

    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedHandle>, DriverError> {
        Ok(self.backend.run_prepare(sql, true))
    }
}

#[async_trait]
impl TransactionBackend for FakeTransaction {
    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.backend.lock().commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.backend.lock().rollbacks += 1;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeStatement {
    backend: FakeBackend,
    sql: String,
    in_transaction: bool,
    closed: Mutex<bool>,
}

#[async_trait]
impl PreparedHandle for FakeStatement {
    async fn exec(&self, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.backend
            .run_exec(CallKind::PreparedExec, &self.sql, args, self.in_transaction)
    }

    async fn query(&self, args: &[Value]) -> Result<Box<dyn RowCursor>, DriverError> {
        Ok(self
            .backend
            .run_query(CallKind::PreparedQuery, &self.sql, args, self.in_transaction))
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.backend.lock().open_statements -= 1;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeCursor {
    backend: FakeBackend,
    columns: Vec<String>,
    rows: VecDeque<Vec<Value>>,
    closed: bool,
}

#[async_trait]
impl RowCursor for FakeCursor {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    async fn next_row(&mut self) -> Result<Option<Vec<Value>>, DriverError> {
        if self.closed {
            return Err(DriverError::Failed("cursor closed".to_string()));
        }
        Ok(self.rows.pop_front())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if !self.closed {
            self.closed = true;
            self.backend.lock().open_cursors -= 1;
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Install a test subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a mapper over `backend` for `dsn` with `statements` registered.
pub fn mapper_with(
    dsn: &str,
    backend: &FakeBackend,
    statements: Vec<StatementBuilder>,
) -> Mapper {
    init_tracing();
    let preference: MapperPreference = dsn.parse().expect("valid dsn");
    Mapper::builder(preference)
        .backend(Arc::new(backend.clone()))
        .statements(statements)
        .build()
        .expect("mapper builds")
}
