//! Tasklane client library: task board with drag-and-drop ordering.

pub mod api;
pub mod board;
pub mod config;
