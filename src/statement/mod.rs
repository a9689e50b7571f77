//! Statement model, construction, refinement and registry.

pub mod builder;
pub mod model;
pub mod refine;
pub mod registry;

pub use builder::{MapperContext, StatementBuilder};
pub use model::{
    BindMode, ColumnBinding, ConditionalClause, PresencePolicy, Statement, StatementKind,
};
pub use refine::{refine, PresenceMap};
pub use registry::{is_user_query, StatementRegistry};
