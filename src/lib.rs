// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod config;
pub mod derived;
pub mod model;
pub mod platform;
pub mod reconcile;
pub mod stats;
pub mod store;
