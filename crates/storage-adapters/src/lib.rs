//! Storage adapters implementing the `domains` ports.
//!
//! `memory` is always compiled; `postgres` requires the `db-postgres` feature.

pub mod memory;

#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::MemoryStore;

#[cfg(feature = "db-postgres")]
pub use postgres::PgStore;
