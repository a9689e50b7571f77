//! Mapper, transactions and bulk execution.

pub mod bulk;
pub mod manager;
pub mod transaction;

pub use bulk::Bulk;
pub use manager::{Mapper, MapperBuilder};
pub use transaction::Transaction;
