//! # Stack Orchestrator
//!
//! Brings up a multi-service stack from a compose-style descriptor: services
//! start in dependency order, health-gated dependents wait for their
//! dependency's readiness probe, and shutdown runs in reverse start order.

pub mod api;
pub mod config;
pub mod event_bus;
pub mod health;
pub mod plan;
pub mod runtime;
pub mod state;
pub mod supervisor;
