//! Parameter classification and binding.

pub mod binder;
pub mod classify;
pub mod param;

pub use binder::{bind_named, bind_positional, bind_row, BoundQuery};
pub use classify::{classify, presence_of, row_shape, CallMode, Classified, NamedParams};
pub use param::{FieldEnumerable, KeyedMapping, OrderedSequence, Param, ScalarLike, ToParam};
