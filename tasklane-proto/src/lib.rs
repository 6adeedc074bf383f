//! Shared data model, wire bodies, and ordering logic for Tasklane.

pub mod api;
pub mod order;
pub mod task;
