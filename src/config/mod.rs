//! Application configuration: schema and SQLite-backed store

pub mod schema;
pub mod store;

pub use schema::*;
pub use store::ConfigStore;
