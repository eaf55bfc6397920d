//! API module
//!
//! A small read-only HTTP surface over the status view of a running stack.

pub mod server;

pub use server::{router, serve};
