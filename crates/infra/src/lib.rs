//! Infrastructure layer: configuration and relational storage.

pub mod config;
pub mod store;

pub use config::{AppConfig, ConfigError, DatabaseConfig};
pub use store::{InMemoryStore, PostgresStore, Store, StoreError, StoreResult};
