//! Placeholder normalization.
//!
//! Statement templates name their parameters with `:name` (one scalar) or
//! `:name[]` (an expandable IN list). Normalization replaces every named
//! placeholder with a hold marker, records the marker position as a
//! [`ColumnBinding`], and then renders the held text in the driver's native
//! placeholder syntax.

use crate::error::StatementError;
use crate::statement::model::{ColumnBinding, Statement};
use std::fmt;
use std::sync::Arc;

/// Marker written into the held text for every placeholder.
pub const HOLD_CHAR: char = '?';

/// Converts named placeholders into driver-native syntax.
pub trait Normalizer: Send + Sync + fmt::Debug {
    /// Rewrite the statement's text, filling its held text, resolved text and
    /// column bindings.
    fn normalize(&self, stmt: &mut Statement) -> Result<(), StatementError>;

    /// Render a held text (possibly with an expanded hold run) in native syntax.
    fn resolve_holding(&self, held: &str) -> String;
}

/// Native placeholder syntax of a driver family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` (MySQL, MariaDB, SQLite)
    QuestionMark,
    /// `$1, $2, ...` (PostgreSQL)
    Dollar,
    /// `@p1, @p2, ...` (SQL Server)
    AtP,
}

/// Normalizer for the three common placeholder families.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderNormalizer {
    style: PlaceholderStyle,
}

impl PlaceholderNormalizer {
    pub fn new(style: PlaceholderStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }
}

/// Select the normalizer for a driver name.
pub fn normalizer_for(driver: &str) -> Result<Arc<dyn Normalizer>, StatementError> {
    let style = match driver.to_ascii_lowercase().as_str() {
        "mysql" | "mariadb" | "sqlite" | "sqlite3" => PlaceholderStyle::QuestionMark,
        "postgres" | "postgresql" | "pgx" => PlaceholderStyle::Dollar,
        "sqlserver" | "mssql" => PlaceholderStyle::AtP,
        _ => {
            return Err(StatementError::NormalizerNotFound {
                driver: driver.to_string(),
            })
        }
    };
    Ok(Arc::new(PlaceholderNormalizer::new(style)))
}

impl Normalizer for PlaceholderNormalizer {
    fn normalize(&self, stmt: &mut Statement) -> Result<(), StatementError> {
        let (held, columns) = hold_placeholders(&stmt.id, &stmt.text)?;
        stmt.resolved_text = self.resolve_holding(&held);
        stmt.held_text = held;
        stmt.columns = columns;
        Ok(())
    }

    fn resolve_holding(&self, held: &str) -> String {
        let prefix = match self.style {
            PlaceholderStyle::QuestionMark => return held.to_string(),
            PlaceholderStyle::Dollar => "$",
            PlaceholderStyle::AtP => "@p",
        };

        let mut out = String::with_capacity(held.len() + 16);
        let mut quote: Option<char> = None;
        let mut ordinal = 0usize;

        for c in held.chars() {
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                    out.push(c);
                }
                None if is_quote(c) => {
                    quote = Some(c);
                    out.push(c);
                }
                None if c == HOLD_CHAR => {
                    ordinal += 1;
                    out.push_str(prefix);
                    out.push_str(&ordinal.to_string());
                }
                None => out.push(c),
            }
        }
        out
    }
}

fn is_quote(c: char) -> bool {
    matches!(c, '\'' | '"' | '`')
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Replace `:name` / `:name[]` with hold markers and collect the bindings.
///
/// Quoted text and `::` casts pass through untouched. A bare `?` in the
/// template is kept as an anonymous hold.
fn hold_placeholders(id: &str, text: &str) -> Result<(String, Vec<ColumnBinding>), StatementError> {
    let mut held = String::with_capacity(text.len());
    let mut columns = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            held.push(c);
            continue;
        }

        if is_quote(c) {
            quote = Some(c);
            held.push(c);
            continue;
        }

        if c != ':' {
            held.push(c);
            continue;
        }

        match chars.peek() {
            Some(&(_, ':')) => {
                chars.next();
                held.push_str("::");
            }
            Some(&(_, next)) if is_name_start(next) => {
                let name_start = start + 1;
                let mut name_end = name_start;
                while let Some(&(pos, nc)) = chars.peek() {
                    if !is_name_char(nc) {
                        break;
                    }
                    name_end = pos + nc.len_utf8();
                    chars.next();
                }
                let name = &text[name_start..name_end];

                let is_array = text[name_end..].starts_with('[');
                if is_array {
                    if !text[name_end..].starts_with("[]") {
                        return Err(StatementError::Malformed {
                            id: id.to_string(),
                            message: format!("unterminated array placeholder :{name}["),
                        });
                    }
                    chars.next();
                    chars.next();
                }

                held.push(HOLD_CHAR);
                let hold_pos = held.len();
                columns.push(if is_array {
                    ColumnBinding::array(name, hold_pos)
                } else {
                    ColumnBinding::new(name, hold_pos)
                });
            }
            _ => held.push(c),
        }
    }

    if let Some(q) = quote {
        return Err(StatementError::Malformed {
            id: id.to_string(),
            message: format!("unterminated quote {q}"),
        });
    }

    Ok((held, columns))
}
