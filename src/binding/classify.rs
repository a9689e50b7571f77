//! Parameter-shape classification.
//!
//! Looks at the first caller-supplied parameter and decides how the whole
//! parameter list is bound: positionally, by name, or as a batch of rows.

use super::param::Param;
use crate::error::ParamError;
use crate::statement::{PresenceMap, Statement};
use crate::types::Value;
use std::collections::HashMap;

/// Parameters addressed by name.
pub type NamedParams = HashMap<String, Param>;

/// Which call is being classified; only executions accept batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Execute,
    Query,
}

/// How a parameter list binds to a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// No parameters at all
    Empty,
    /// Values bound in column order
    Positional(Vec<Param>),
    /// Values looked up by column name
    Named {
        values: NamedParams,
        presence: PresenceMap,
    },
    /// One row per element, each a mapping, record or list
    Batch(Vec<Param>),
}

impl Classified {
    /// Presence map used by conditional refinement.
    ///
    /// Only named parameters provide one; every other shape yields `None`.
    pub fn presence(&self) -> Option<&PresenceMap> {
        match self {
            Classified::Named { presence, .. } => Some(presence),
            _ => None,
        }
    }
}

/// Look through one level of optional indirection.
pub fn deref_param(param: &Param) -> Result<&Param, ParamError> {
    match param {
        Param::Optional(None) => Err(ParamError::NilPtr),
        Param::Optional(Some(inner)) => match inner.as_ref() {
            Param::Optional(_) => Err(ParamError::PtrNotSupported),
            other => Ok(other),
        },
        other => Ok(other),
    }
}

/// Classify `params` for `stmt`.
pub fn classify(
    stmt: &Statement,
    params: &[Param],
    mode: CallMode,
) -> Result<Classified, ParamError> {
    let Some(first) = params.first() else {
        return Ok(Classified::Empty);
    };

    match deref_param(first)? {
        Param::Opaque(_) => Err(ParamError::InterfaceNotSupported),
        Param::Scalar(_) => Ok(Classified::Positional(params.to_vec())),
        Param::Mapping(entries) => named_from_mapping(entries),
        Param::Record(fields) => Ok(named_from_record(fields)),
        Param::Sequence(items) => {
            if stmt.has_array_bind() {
                if stmt.first_is_array_bind() {
                    return Ok(Classified::Positional(params.to_vec()));
                }
                return Ok(Classified::Positional(items.clone()));
            }

            match items.first().map(row_shape) {
                Some(Some(kind)) => match mode {
                    CallMode::Execute => Ok(Classified::Batch(items.clone())),
                    CallMode::Query => Err(ParamError::UnacceptableListElement { kind }),
                },
                _ => Ok(Classified::Positional(items.clone())),
            }
        }
        Param::Optional(_) => Err(ParamError::PtrNotSupported),
    }
}

/// Shape name of a batch row, or `None` when the element is not a row.
pub fn row_shape(param: &Param) -> Option<&'static str> {
    let inner = match param {
        Param::Optional(Some(inner)) => inner.as_ref(),
        other => other,
    };
    inner.is_composite().then(|| inner.kind_name())
}

/// Values of a mapping by key; keys must be text.
pub fn mapping_values(entries: &[(Param, Param)]) -> Result<NamedParams, ParamError> {
    let mut values = NamedParams::with_capacity(entries.len());
    for (key, value) in entries {
        let Param::Scalar(Value::Text(name)) = key else {
            return Err(ParamError::InvalidMapKeyType);
        };
        values.insert(name.clone(), value.clone());
    }
    Ok(values)
}

/// Presence map of the first parameter, before the statement is refined.
///
/// Mappings and records provide one; no parameters or any other shape
/// yield `None`.
pub fn presence_of(params: &[Param]) -> Result<Option<PresenceMap>, ParamError> {
    let Some(first) = params.first() else {
        return Ok(None);
    };

    match deref_param(first)? {
        Param::Mapping(entries) => Ok(Some(mapping_values(entries)?.into_keys().collect())),
        Param::Record(fields) => Ok(Some(record_presence(fields))),
        _ => Ok(None),
    }
}

fn named_from_mapping(entries: &[(Param, Param)]) -> Result<Classified, ParamError> {
    let values = mapping_values(entries)?;
    let presence = values.keys().cloned().collect();
    Ok(Classified::Named { values, presence })
}

fn named_from_record(fields: &[(String, Param)]) -> Classified {
    let presence = record_presence(fields);
    let values = fields.iter().cloned().collect();
    Classified::Named { values, presence }
}

/// `None` fields count as absent.
fn record_presence(fields: &[(String, Param)]) -> PresenceMap {
    fields
        .iter()
        .filter(|(_, value)| !matches!(value, Param::Optional(None) | Param::Scalar(Value::Null)))
        .map(|(name, _)| name.clone())
        .collect()
}
