//! Database module for PostgreSQL persistence.

mod pool;
pub mod query;
mod records;

pub use pool::*;
pub use records::*;
