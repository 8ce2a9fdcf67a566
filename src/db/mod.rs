//! Record store: row models and SQL repositories.
//!
//! - `model`: row structs returned by queries and their mapping onto the
//!   domain types in `crate::model`.
//! - `repo`: SQL-only functions; every write is a single-row upsert or a
//!   single-row conditional update.

pub mod model;
pub mod repo;

pub use repo::*;
