//! Mapper configuration.

pub mod preference;

pub use preference::{FieldNaming, MapperPreference, PreferenceBuilder};
