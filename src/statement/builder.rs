//! Statement construction.
//!
//! A [`MapperContext`] owns the chosen normalizer and the clause token
//! sequence. It is created once per mapper and threaded through building
//! and refinement.

use super::model::{ConditionalClause, PresencePolicy, Statement, StatementKind};
use crate::error::StatementError;
use crate::normalize::Normalizer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Wrapper around clause sequence numbers; never appears in user SQL.
const CLAUSE_TOKEN_WRAP: char = '\0';

/// Per-mapper state needed to build and refine statements.
#[derive(Debug)]
pub struct MapperContext {
    normalizer: Arc<dyn Normalizer>,
    clause_seq: AtomicU64,
}

impl MapperContext {
    pub fn new(normalizer: Arc<dyn Normalizer>) -> Self {
        Self {
            normalizer,
            clause_seq: AtomicU64::new(0),
        }
    }

    pub fn normalizer(&self) -> &dyn Normalizer {
        self.normalizer.as_ref()
    }

    /// Next unique clause token, `\0<seq>\0`.
    pub fn next_clause_token(&self) -> String {
        let seq = self.clause_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{CLAUSE_TOKEN_WRAP}{seq}{CLAUSE_TOKEN_WRAP}")
    }

    /// Build a statement for raw SQL text passed in place of an id.
    ///
    /// The text doubles as the id and the kind is taken from its leading keyword.
    pub fn build_user_query(&self, sql: &str) -> Result<Statement, StatementError> {
        let mut stmt = Statement::new(sql, StatementKind::from_sql(sql), sql);
        self.normalizer.normalize(&mut stmt)?;
        Ok(stmt)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Sql(String),
    Clause {
        key: String,
        fragment: String,
        policy: PresencePolicy,
    },
}

/// Collects the pieces of one statement declaration.
///
/// # Example
///
/// ```
/// use stmtmap::statement::{MapperContext, StatementBuilder, StatementKind};
/// use stmtmap::normalize::normalizer_for;
///
/// let ctx = MapperContext::new(normalizer_for("mysql")?);
/// let stmt = StatementBuilder::new("findUsers", StatementKind::Select)
///     .sql("SELECT id, name FROM users WHERE 1 = 1")
///     .if_present("age", " AND age > :age")
///     .build(&ctx)?;
/// assert!(stmt.has_condition());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    id: String,
    kind: StatementKind,
    segments: Vec<Segment>,
}

impl StatementBuilder {
    pub fn new(id: &str, kind: StatementKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            segments: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append literal SQL text.
    pub fn sql(mut self, text: &str) -> Self {
        self.segments.push(Segment::Sql(text.to_string()));
        self
    }

    /// Append a fragment included only when `key` is supplied.
    pub fn if_present(self, key: &str, fragment: &str) -> Self {
        self.clause(key, fragment, PresencePolicy::IncludeIfPresent)
    }

    /// Append a fragment included only when `key` is not supplied.
    pub fn if_absent(self, key: &str, fragment: &str) -> Self {
        self.clause(key, fragment, PresencePolicy::IncludeIfAbsent)
    }

    /// Append a conditional fragment with an explicit policy.
    pub fn clause(mut self, key: &str, fragment: &str, policy: PresencePolicy) -> Self {
        self.segments.push(Segment::Clause {
            key: key.to_string(),
            fragment: fragment.to_string(),
            policy,
        });
        self
    }

    /// Produce the statement.
    ///
    /// Statements without clauses are normalized right away; the others are
    /// normalized after each refinement. Those are checked here anyway, once
    /// with every fragment spliced in and once with every fragment dropped,
    /// so a malformed template fails before any call is made.
    pub fn build(self, ctx: &MapperContext) -> Result<Statement, StatementError> {
        if !self.kind.is_sql() {
            return Err(StatementError::Malformed {
                id: self.id,
                message: format!("element kind {} cannot be registered", self.kind),
            });
        }

        let mut stmt = Statement::new(&self.id, self.kind, "");
        for segment in self.segments {
            match segment {
                Segment::Sql(text) => stmt.text.push_str(&text),
                Segment::Clause {
                    key,
                    fragment,
                    policy,
                } => {
                    let token = ctx.next_clause_token();
                    stmt.text.push_str(&token);
                    stmt.clauses
                        .push(ConditionalClause::new(token, &key, &fragment, policy));
                }
            }
        }

        if stmt.has_condition() {
            check_fragments(&stmt, ctx)?;
        } else {
            ctx.normalizer().normalize(&mut stmt)?;
        }
        Ok(stmt)
    }
}

fn check_fragments(stmt: &Statement, ctx: &MapperContext) -> Result<(), StatementError> {
    for include in [true, false] {
        let mut trial = stmt.clone();
        for clause in stmt.clauses() {
            let replacement = if include { clause.fragment() } else { "" };
            trial.text = trial.text.replace(clause.token(), replacement);
        }
        ctx.normalizer().normalize(&mut trial)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{PlaceholderNormalizer, PlaceholderStyle};

    fn context() -> MapperContext {
        MapperContext::new(Arc::new(PlaceholderNormalizer::new(
            PlaceholderStyle::QuestionMark,
        )))
    }

    #[test]
    fn test_clause_tokens_are_unique() {
        let ctx = context();
        let first = ctx.next_clause_token();
        let second = ctx.next_clause_token();
        assert_ne!(first, second);
        assert!(first.starts_with('\0') && first.ends_with('\0'));
    }

    #[test]
    fn test_build_without_clauses_normalizes() {
        let ctx = context();
        let stmt = StatementBuilder::new("findByAge", StatementKind::Select)
            .sql("SELECT id, name FROM users WHERE age > :age")
            .build(&ctx)
            .unwrap();

        assert!(!stmt.has_condition());
        assert_eq!(
            stmt.resolved_text(),
            "SELECT id, name FROM users WHERE age > ?"
        );
        assert_eq!(stmt.columns().len(), 1);
    }

    #[test]
    fn test_build_with_clauses_defers_normalization() {
        let ctx = context();
        let stmt = StatementBuilder::new("findUsers", StatementKind::Select)
            .sql("SELECT * FROM users WHERE 1 = 1")
            .if_present("age", " AND age > :age")
            .if_absent("name", " AND name IS NULL")
            .build(&ctx)
            .unwrap();

        assert_eq!(stmt.clauses().len(), 2);
        assert!(stmt.text().contains(stmt.clauses()[0].token()));
        assert!(stmt.resolved_text().is_empty());
        assert_eq!(
            stmt.clauses()[1].policy(),
            PresencePolicy::IncludeIfAbsent
        );
    }

    #[test]
    fn test_malformed_template_with_clauses_rejected() {
        let ctx = context();
        let err = StatementBuilder::new("broken", StatementKind::Select)
            .sql("SELECT * FROM t WHERE name = 'oops")
            .if_present("a", " AND a = :a")
            .build(&ctx)
            .unwrap_err();
        assert!(matches!(err, StatementError::Malformed { ref id, .. } if id == "broken"));

        let err = StatementBuilder::new("badArray", StatementKind::Select)
            .sql("SELECT * FROM t WHERE 1 = 1")
            .if_present("ids", " AND id IN (:ids[)")
            .build(&ctx)
            .unwrap_err();
        assert!(matches!(err, StatementError::Malformed { .. }));
    }

    #[test]
    fn test_fragment_kind_is_rejected() {
        let ctx = context();
        let err = StatementBuilder::new("frag", StatementKind::ConditionalFragment)
            .sql("AND 1 = 1")
            .build(&ctx)
            .unwrap_err();
        assert!(matches!(err, StatementError::Malformed { .. }));
    }

    #[test]
    fn test_user_query_kind_detection() {
        let ctx = context();
        let stmt = ctx
            .build_user_query("INSERT INTO users (name) VALUES (:name)")
            .unwrap();
        assert_eq!(stmt.kind(), StatementKind::Insert);
        assert_eq!(stmt.id(), "INSERT INTO users (name) VALUES (:name)");
        assert_eq!(stmt.resolved_text(), "INSERT INTO users (name) VALUES (?)");
    }
}
