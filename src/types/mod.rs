//! Scalar value types shared by binding and result materialization.

pub mod value;

pub use value::{FromValue, Value};
