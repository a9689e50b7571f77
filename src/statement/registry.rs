//! Registered statements, keyed by case-insensitive id.

use super::builder::MapperContext;
use super::model::Statement;
use crate::error::StatementError;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only lookup table once built.
#[derive(Debug, Default)]
pub struct StatementRegistry {
    statements: HashMap<String, Arc<Statement>>,
}

impl StatementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a statement; ids compare case-insensitively.
    pub fn register(&mut self, stmt: Statement) -> Result<(), StatementError> {
        let key = stmt.id().to_uppercase();
        if self.statements.contains_key(&key) {
            return Err(StatementError::Duplicate { id: key });
        }

        tracing::debug!("stmt [{}] loaded", key);
        self.statements.insert(key, Arc::new(stmt));
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Statement>> {
        self.statements.get(&id.to_uppercase()).cloned()
    }

    /// Look up `id`, or build an ad-hoc statement when `id` is raw SQL.
    pub fn find(&self, id: &str, ctx: &MapperContext) -> Result<Arc<Statement>, StatementError> {
        if let Some(stmt) = self.get(id) {
            return Ok(stmt);
        }

        if is_user_query(id) {
            return ctx.build_user_query(id).map(Arc::new);
        }

        Err(StatementError::NotFound { id: id.to_string() })
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.statements.keys().map(String::as_str)
    }
}

/// True when `id` is SQL text rather than a statement id: one of space,
/// tab, CR or LF occurs somewhere after its first character.
///
/// Each character is looked up on its own, so multi-line text starting with
/// a newline still counts.
pub fn is_user_query(id: &str) -> bool {
    USER_QUERY_MARKERS
        .iter()
        .any(|marker| id.find(*marker).is_some_and(|pos| pos > 0))
}

const USER_QUERY_MARKERS: [char; 4] = [' ', '\t', '\n', '\r'];
