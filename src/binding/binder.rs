//! Column binding and IN-array expansion.
//!
//! Turns classified parameters into the flat argument list a driver call
//! takes, rewriting the statement text when an array column expands into
//! several placeholders.

use super::classify::{deref_param, mapping_values, NamedParams};
use super::param::Param;
use crate::error::{BindError, MapperError, ParamError};
use crate::normalize::{Normalizer, HOLD_CHAR};
use crate::statement::{ColumnBinding, Statement};
use crate::types::Value;
use std::borrow::Cow;

/// SQL text and arguments ready for one driver call.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery<'a> {
    pub sql: Cow<'a, str>,
    pub args: Vec<Value>,
}

impl BoundQuery<'_> {
    pub fn into_owned(self) -> BoundQuery<'static> {
        BoundQuery {
            sql: Cow::Owned(self.sql.into_owned()),
            args: self.args,
        }
    }
}

/// Bind a positional parameter list.
///
/// Without array columns every value is passed through in order. With array
/// columns each column takes the value at its index.
pub fn bind_positional<'a>(
    stmt: &'a Statement,
    params: &[Param],
    normalizer: &dyn Normalizer,
) -> Result<BoundQuery<'a>, MapperError> {
    let defined = stmt.columns().len();
    if defined > params.len() {
        return Err(BindError::CountMismatch {
            defined,
            args: params.len(),
        }
        .into());
    }

    if !stmt.has_array_bind() {
        let args = params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let name = stmt
                    .columns()
                    .get(i)
                    .map_or_else(|| format!("#{}", i + 1), |c| c.name().to_string());
                to_scalar(&name, p)
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(BoundQuery {
            sql: Cow::Borrowed(stmt.resolved_text()),
            args,
        });
    }

    bind_columns(stmt, normalizer, |i, _| Ok(&params[i]))
}

/// Bind by looking up every column name.
pub fn bind_named<'a>(
    stmt: &'a Statement,
    values: &NamedParams,
    normalizer: &dyn Normalizer,
) -> Result<BoundQuery<'a>, MapperError> {
    bind_columns(stmt, normalizer, |_, column| {
        values.get(column.name()).ok_or_else(|| {
            BindError::MissingKey {
                name: column.name().to_string(),
            }
            .into()
        })
    })
}

/// Arguments for one batch row; batches never carry array columns.
pub fn bind_row(stmt: &Statement, row: &Param) -> Result<Vec<Value>, MapperError> {
    let row = deref_param(row)?;
    let mut args = Vec::with_capacity(stmt.columns().len());

    match row {
        Param::Sequence(items) => {
            if stmt.columns().len() > items.len() {
                return Err(BindError::CountMismatch {
                    defined: stmt.columns().len(),
                    args: items.len(),
                }
                .into());
            }
            for (column, item) in stmt.columns().iter().zip(items) {
                args.push(to_scalar(column.name(), item)?);
            }
        }
        Param::Mapping(_) | Param::Record(_) => {
            let named = named_values(row)?;
            for column in stmt.columns() {
                let value = named.get(column.name()).ok_or_else(|| BindError::MissingKey {
                    name: column.name().to_string(),
                })?;
                args.push(to_scalar(column.name(), value)?);
            }
        }
        other => {
            return Err(BindError::NotScalar {
                name: other.kind_name().to_string(),
            }
            .into())
        }
    }
    Ok(args)
}

fn named_values(row: &Param) -> Result<NamedParams, ParamError> {
    match row {
        Param::Mapping(entries) => mapping_values(entries),
        Param::Record(fields) => Ok(fields.iter().cloned().collect()),
        _ => Ok(NamedParams::new()),
    }
}

fn bind_columns<'a, 'p, F>(
    stmt: &'a Statement,
    normalizer: &dyn Normalizer,
    lookup: F,
) -> Result<BoundQuery<'a>, MapperError>
where
    F: Fn(usize, &ColumnBinding) -> Result<&'p Param, MapperError>,
{
    let mut args = Vec::with_capacity(stmt.columns().len());
    let mut held: Option<String> = None;

    for (i, column) in stmt.columns().iter().enumerate() {
        let param = lookup(i, column)?;

        if !column.is_array() {
            args.push(to_scalar(column.name(), param)?);
            continue;
        }

        let elements = flatten_array(column.name(), param)?;
        let cnt = elements.len();
        args.extend(elements);

        if cnt > 1 {
            if held.is_some() {
                return Err(BindError::MultipleArrayBinding.into());
            }
            held = Some(expand_hold(stmt.held_text(), column.hold_pos(), cnt));
        }
    }

    let sql = match held {
        Some(text) => Cow::Owned(normalizer.resolve_holding(&text)),
        None => Cow::Borrowed(stmt.resolved_text()),
    };
    Ok(BoundQuery { sql, args })
}

/// Scalar value of a normal column.
pub fn to_scalar(name: &str, param: &Param) -> Result<Value, MapperError> {
    match param {
        Param::Scalar(value) => Ok(value.clone()),
        Param::Optional(None) => Ok(Value::Null),
        Param::Optional(Some(inner)) => match inner.as_ref() {
            Param::Optional(_) => Err(ParamError::PtrNotSupported.into()),
            other => to_scalar(name, other),
        },
        Param::Opaque(_) => Err(ParamError::InterfaceNotSupported.into()),
        Param::Sequence(_) | Param::Mapping(_) | Param::Record(_) => Err(BindError::NotScalar {
            name: name.to_string(),
        }
        .into()),
    }
}

/// Elements bound to an array column. Scalars and nulls count as one
/// element.
///
/// An empty list binds a single NULL so the placeholder stays filled: the
/// argument list then grows by one for that column, not by the list length
/// of zero.
fn flatten_array(name: &str, param: &Param) -> Result<Vec<Value>, MapperError> {
    let inner = match param {
        Param::Optional(Some(inner)) => inner.as_ref(),
        other => other,
    };

    match inner {
        Param::Sequence(items) if items.is_empty() => Ok(vec![Value::Null]),
        Param::Sequence(items) => items.iter().map(|item| to_scalar(name, item)).collect(),
        other => Ok(vec![to_scalar(name, other)?]),
    }
}

/// Replace the hold marker at 1-based `hold_pos` with `cnt` comma-separated markers.
fn expand_hold(held: &str, hold_pos: usize, cnt: usize) -> String {
    let at = hold_pos - 1;
    let mut out = String::with_capacity(held.len() + cnt * 2);
    out.push_str(&held[..at]);
    for i in 0..cnt {
        if i > 0 {
            out.push(',');
        }
        out.push(HOLD_CHAR);
    }
    out.push_str(&held[at + HOLD_CHAR.len_utf8()..]);
    out
}
