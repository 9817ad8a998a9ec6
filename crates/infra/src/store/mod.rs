//! Relational storage boundary.
//!
//! [`Store`] is the single storage abstraction the service depends on. Two
//! implementations are provided: an in-memory one for tests and local runs,
//! and a Postgres one for deployments.

mod access;
pub mod in_memory;
pub mod model;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use model::*;
pub use postgres::PostgresStore;
pub use r#trait::{Store, StoreError, StoreResult};
