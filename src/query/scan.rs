//! Row scanning into caller destinations.
//!
//! A destination describes itself through [`Scannable`]: a list of value
//! slots scanned by position, a record scanned by field name, or a shape that
//! cannot be scanned at all. Record columns are matched to fields through a
//! [`FieldNameConvertStrategy`].

use crate::error::{ConversionError, MapperError, ParamError, ResultError};
use crate::types::{FromValue, Value};
use chrono::NaiveDateTime;
use std::any::Any;
use std::fmt;

/// A destination for one column value.
pub trait ValueSlot {
    fn set_value(&mut self, value: Value) -> Result<(), ConversionError>;
}

impl<T: FromValue> ValueSlot for T {
    fn set_value(&mut self, value: Value) -> Result<(), ConversionError> {
        *self = T::from_value(value)?;
        Ok(())
    }
}

/// A record whose fields can be set by name.
pub trait FieldAssign {
    /// Set `field` from `value`. Returns `false` when the record has no such
    /// field.
    fn assign_field(&mut self, field: &str, value: Value) -> Result<bool, ConversionError>;
}

/// How a destination receives a row.
pub enum ScanTarget<'a> {
    /// One slot per column, in column order
    Values(Vec<&'a mut dyn ValueSlot>),
    /// Fields matched by converted column name
    Record(&'a mut dyn FieldAssign),
    /// Type-erased destination
    Opaque,
    /// Reference to another destination
    Indirect,
}

impl fmt::Debug for ScanTarget<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanTarget::Values(slots) => write!(f, "Values({})", slots.len()),
            ScanTarget::Record(_) => f.write_str("Record"),
            ScanTarget::Opaque => f.write_str("Opaque"),
            ScanTarget::Indirect => f.write_str("Indirect"),
        }
    }
}

/// A value rows can be scanned into.
pub trait Scannable {
    fn scan_target(&mut self) -> ScanTarget<'_>;
}

/// Implement [`Scannable`] for types scanned as one column through `FromValue`.
#[macro_export]
macro_rules! impl_value_scan {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::query::scan::Scannable for $ty {
                fn scan_target(&mut self) -> $crate::query::scan::ScanTarget<'_> {
                    $crate::query::scan::ScanTarget::Values(vec![self])
                }
            }
        )*
    };
}

impl_value_scan!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u16,
    u32,
    u64,
    f32,
    f64,
    String,
    Vec<u8>,
    NaiveDateTime,
    Value
);

impl<T: FromValue> Scannable for Option<T> {
    fn scan_target(&mut self) -> ScanTarget<'_> {
        ScanTarget::Values(vec![self])
    }
}

macro_rules! tuple_scan {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: FromValue),+> Scannable for ($($name,)+) {
            fn scan_target(&mut self) -> ScanTarget<'_> {
                ScanTarget::Values(vec![$(&mut self.$idx),+])
            }
        }
    };
}

tuple_scan!(A: 0);
tuple_scan!(A: 0, B: 1);
tuple_scan!(A: 0, B: 1, C: 2);
tuple_scan!(A: 0, B: 1, C: 2, D: 3);
tuple_scan!(A: 0, B: 1, C: 2, D: 3, E: 4);
tuple_scan!(A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);

impl<T: Scannable + ?Sized> Scannable for &mut T {
    fn scan_target(&mut self) -> ScanTarget<'_> {
        ScanTarget::Indirect
    }
}

impl Scannable for Box<dyn Any + Send> {
    fn scan_target(&mut self) -> ScanTarget<'_> {
        ScanTarget::Opaque
    }
}

/// Maps a result column name to a record field name.
pub trait FieldNameConvertStrategy: Send + Sync + fmt::Debug {
    fn convert(&self, column: &str) -> String;
}

/// `userName`, `UserName` and `USER_NAME` all become `user_name`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeCaseStrategy;

impl FieldNameConvertStrategy for SnakeCaseStrategy {
    fn convert(&self, column: &str) -> String {
        let chars: Vec<char> = column.chars().collect();
        let mut out = String::with_capacity(column.len() + 4);

        for (i, &c) in chars.iter().enumerate() {
            if !c.is_alphanumeric() {
                if !out.is_empty() && !out.ends_with('_') {
                    out.push('_');
                }
                continue;
            }

            if c.is_uppercase() && i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                let boundary = prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_lower);
                if boundary && !out.is_empty() && !out.ends_with('_') {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        }

        while out.ends_with('_') {
            out.pop();
        }
        out
    }
}

/// Column names are used as field names unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactStrategy;

impl FieldNameConvertStrategy for ExactStrategy {
    fn convert(&self, column: &str) -> String {
        column.to_string()
    }
}

/// Scan one row into `dest`.
pub fn scan_row<T: Scannable + ?Sized>(
    columns: &[String],
    row: Vec<Value>,
    dest: &mut T,
    strategy: &dyn FieldNameConvertStrategy,
) -> Result<(), MapperError> {
    match dest.scan_target() {
        ScanTarget::Opaque => Err(ParamError::InterfaceNotSupported.into()),
        ScanTarget::Indirect => Err(ParamError::PtrNotSupported.into()),
        ScanTarget::Values(mut slots) => {
            if slots.len() != row.len() {
                return Err(ResultError::ColumnCountMismatch {
                    expected: row.len(),
                    got: slots.len(),
                }
                .into());
            }
            for (i, (slot, value)) in slots.iter_mut().zip(row).enumerate() {
                slot.set_value(value).map_err(|source| ResultError::Scan {
                    column: column_name(columns, i),
                    source,
                })?;
            }
            Ok(())
        }
        ScanTarget::Record(record) => {
            for (i, value) in row.into_iter().enumerate() {
                let column = column_name(columns, i);
                let field = strategy.convert(&column);
                // unmatched columns are discarded
                record
                    .assign_field(&field, value)
                    .map_err(|source| ResultError::Scan { column, source })?;
            }
            Ok(())
        }
    }
}

fn column_name(columns: &[String], index: usize) -> String {
    columns
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("#{}", index + 1))
}
