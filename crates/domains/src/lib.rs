//! The domain models, errors and port definitions for forum ranking.
//!
//! This crate performs no I/O. Services depend on the traits in [`ports`];
//! adapters implement them.

pub mod clock;
pub mod errors;
pub mod models;
pub mod ports;

pub use clock::*;
pub use errors::*;
pub use models::*;
pub use ports::*;
