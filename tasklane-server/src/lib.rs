//! Tasklane server library.
//!
//! Exposes the store and router for use in tests and embedding. The store
//! owns all sort-key writes; the router is a thin JSON layer over it.

pub mod config;
pub mod keys;
pub mod routes;
pub mod schema;
pub mod store;
