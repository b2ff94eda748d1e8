//! Infrastructure layer: PostgreSQL implementations of the storage ports.

pub mod error;
pub mod postgres;

pub use postgres::PgStore;
