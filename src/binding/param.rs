//! Parameter values and the capabilities that produce them.
//!
//! Callers hand the mapper anything implementing [`ToParam`]. The conversion
//! yields a [`Param`], a tagged description of the value's shape that the
//! classifier and binder match on. Types opt into a shape through one of the
//! capability traits: [`ScalarLike`], [`FieldEnumerable`], [`KeyedMapping`]
//! or [`OrderedSequence`].

use crate::types::Value;
use chrono::NaiveDateTime;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// Shape of a caller-supplied parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A driver-native scalar, bound as is
    Scalar(Value),
    /// An ordered list
    Sequence(Vec<Param>),
    /// Key/value pairs; keys must be text to be bound by name
    Mapping(Vec<(Param, Param)>),
    /// Named fields of a structured record
    Record(Vec<(String, Param)>),
    /// One level of optional indirection
    Optional(Option<Box<Param>>),
    /// A type-erased value with no bindable shape
    Opaque(&'static str),
}

impl Param {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Param::Scalar(_) => "scalar",
            Param::Sequence(_) => "sequence",
            Param::Mapping(_) => "mapping",
            Param::Record(_) => "record",
            Param::Optional(_) => "optional",
            Param::Opaque(_) => "opaque",
        }
    }

    pub fn from_record(record: &(impl FieldEnumerable + ?Sized)) -> Self {
        Param::Record(
            record
                .enumerate_fields()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    pub fn from_mapping(mapping: &(impl KeyedMapping + ?Sized)) -> Self {
        Param::Mapping(mapping.entries())
    }

    pub fn from_sequence(seq: &(impl OrderedSequence + ?Sized)) -> Self {
        Param::Sequence(seq.elements())
    }

    /// The scalar value, looking through one `Some`.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Param::Scalar(v) => Some(v),
            Param::Optional(Some(inner)) => match inner.as_ref() {
                Param::Scalar(v) => Some(v),
                _ => None,
            },
            _ => None,
        }
    }

    /// True for mappings, records and lists.
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            Param::Sequence(_) | Param::Mapping(_) | Param::Record(_)
        )
    }
}

/// Conversion into a [`Param`].
pub trait ToParam {
    fn to_param(&self) -> Param;
}

/// A value the driver understands natively.
///
/// A record implementing this is bound as one scalar and never decomposed
/// into fields. Pair it with [`impl_scalar!`](crate::impl_scalar).
pub trait ScalarLike {
    fn to_value(&self) -> Value;
}

/// A structured record exposing its fields by name.
///
/// Usually generated with [`impl_record!`](crate::impl_record).
pub trait FieldEnumerable {
    fn enumerate_fields(&self) -> Vec<(&'static str, Param)>;
}

/// A key/value collection.
pub trait KeyedMapping {
    fn entries(&self) -> Vec<(Param, Param)>;
}

/// An ordered collection.
pub trait OrderedSequence {
    fn elements(&self) -> Vec<Param>;
}

/// Implement [`ToParam`] for types that already implement [`ScalarLike`].
#[macro_export]
macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::binding::ToParam for $ty {
                fn to_param(&self) -> $crate::binding::Param {
                    $crate::binding::Param::Scalar($crate::binding::ScalarLike::to_value(self))
                }
            }
        )*
    };
}

/// Implement the record capabilities for a struct.
///
/// Generates [`FieldEnumerable`] and [`ToParam`] so the struct can be passed
/// as a named parameter, plus `FieldAssign` and `Scannable` so rows can be
/// scanned into it. Every listed field must implement both `ToParam` and
/// `FromValue`.
///
/// ```
/// use stmtmap::impl_record;
///
/// #[derive(Debug, Default)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl_record!(User { id, name });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::binding::FieldEnumerable for $ty {
            fn enumerate_fields(&self) -> Vec<(&'static str, $crate::binding::Param)> {
                vec![
                    $((stringify!($field), $crate::binding::ToParam::to_param(&self.$field)),)*
                ]
            }
        }

        impl $crate::binding::ToParam for $ty {
            fn to_param(&self) -> $crate::binding::Param {
                $crate::binding::Param::from_record(self)
            }
        }

        impl $crate::query::scan::FieldAssign for $ty {
            fn assign_field(
                &mut self,
                field: &str,
                value: $crate::types::Value,
            ) -> Result<bool, $crate::error::ConversionError> {
                match field {
                    $(
                        stringify!($field) => {
                            self.$field = $crate::types::FromValue::from_value(value)?;
                            Ok(true)
                        }
                    )*
                    _ => Ok(false),
                }
            }
        }

        impl $crate::query::scan::Scannable for $ty {
            fn scan_target(&mut self) -> $crate::query::scan::ScanTarget<'_> {
                $crate::query::scan::ScanTarget::Record(self)
            }
        }
    };
}

/// Build a parameter list from heterogeneous values.
///
/// ```
/// use stmtmap::params;
///
/// let args = params![30, "alice", Some(1.5)];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        Vec::<$crate::binding::Param>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::binding::ToParam::to_param(&$value)),+]
    };
}

macro_rules! scalar_like_from {
    ($($ty:ty),*) => {
        $(
            impl ScalarLike for $ty {
                fn to_value(&self) -> Value {
                    Value::from(self.clone())
                }
            }
        )*
        impl_scalar!($($ty),*);
    };
}

scalar_like_from!(bool, i8, i16, i32, i64, u16, u32, f32, f64, String, NaiveDateTime);

impl ScalarLike for str {
    fn to_value(&self) -> Value {
        Value::Text(self.to_string())
    }
}

impl ScalarLike for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl_scalar!(str, Value);

impl ToParam for Param {
    fn to_param(&self) -> Param {
        self.clone()
    }
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn to_param(&self) -> Param {
        (**self).to_param()
    }
}

impl<T: ToParam> ToParam for Option<T> {
    fn to_param(&self) -> Param {
        Param::Optional(self.as_ref().map(|v| Box::new(v.to_param())))
    }
}

impl<T: ToParam> OrderedSequence for [T] {
    fn elements(&self) -> Vec<Param> {
        self.iter().map(ToParam::to_param).collect()
    }
}

impl<T: ToParam> OrderedSequence for Vec<T> {
    fn elements(&self) -> Vec<Param> {
        self.as_slice().elements()
    }
}

impl<T: ToParam, const N: usize> OrderedSequence for [T; N] {
    fn elements(&self) -> Vec<Param> {
        self.as_slice().elements()
    }
}

impl<T: ToParam> ToParam for [T] {
    fn to_param(&self) -> Param {
        Param::from_sequence(self)
    }
}

impl<T: ToParam> ToParam for Vec<T> {
    fn to_param(&self) -> Param {
        Param::from_sequence(self)
    }
}

impl<T: ToParam, const N: usize> ToParam for [T; N] {
    fn to_param(&self) -> Param {
        Param::from_sequence(self)
    }
}

impl<K: ToParam, V: ToParam, S: BuildHasher> KeyedMapping for HashMap<K, V, S> {
    fn entries(&self) -> Vec<(Param, Param)> {
        self.iter().map(|(k, v)| (k.to_param(), v.to_param())).collect()
    }
}

impl<K: ToParam, V: ToParam> KeyedMapping for BTreeMap<K, V> {
    fn entries(&self) -> Vec<(Param, Param)> {
        self.iter().map(|(k, v)| (k.to_param(), v.to_param())).collect()
    }
}

impl<K: ToParam, V: ToParam, S: BuildHasher> ToParam for HashMap<K, V, S> {
    fn to_param(&self) -> Param {
        Param::from_mapping(self)
    }
}

impl<K: ToParam, V: ToParam> ToParam for BTreeMap<K, V> {
    fn to_param(&self) -> Param {
        Param::from_mapping(self)
    }
}

impl ToParam for serde_json::Value {
    fn to_param(&self) -> Param {
        use serde_json::Value as Json;

        match self {
            Json::Null => Param::Scalar(Value::Null),
            Json::Bool(b) => Param::Scalar(Value::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Param::Scalar(Value::Int(i)),
                None => Param::Scalar(n.as_f64().map_or(Value::Null, Value::Float)),
            },
            Json::String(s) => Param::Scalar(Value::Text(s.clone())),
            Json::Array(items) => Param::from_sequence(items),
            Json::Object(map) => Param::Mapping(
                map.iter()
                    .map(|(k, v)| (Param::Scalar(Value::Text(k.clone())), v.to_param()))
                    .collect(),
            ),
        }
    }
}

impl ToParam for Box<dyn Any + Send + Sync> {
    fn to_param(&self) -> Param {
        Param::Opaque("dyn Any")
    }
}
