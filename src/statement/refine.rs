//! Conditional refinement.
//!
//! Splices or drops every conditional fragment of a statement according to
//! which parameter names the caller supplied, then re-normalizes the result.

use super::model::{PresencePolicy, Statement};
use crate::error::StatementError;
use crate::normalize::Normalizer;
use std::collections::HashSet;

/// Parameter names supplied by the caller.
pub type PresenceMap = HashSet<String>;

/// Resolve all clause tokens on a clone of `stmt`.
///
/// With no presence map every token is replaced by an empty string, whatever
/// the clause policy.
pub fn refine(
    stmt: &Statement,
    presence: Option<&PresenceMap>,
    normalizer: &dyn Normalizer,
) -> Result<Statement, StatementError> {
    let mut refined = stmt.clone();

    for clause in stmt.clauses() {
        let include = presence.is_some_and(|present| {
            let found = present.contains(clause.key());
            match clause.policy() {
                PresencePolicy::IncludeIfPresent => found,
                PresencePolicy::IncludeIfAbsent => !found,
            }
        });

        let replacement = if include { clause.fragment() } else { "" };
        refined.text = refined.text.replace(clause.token(), replacement);
    }

    normalizer.normalize(&mut refined)?;
    Ok(refined)
}
