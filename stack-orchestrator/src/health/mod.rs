//! Readiness gating: turning a probe into a one-way health verdict.

pub mod gate;

pub use gate::{GateOutcome, ReadinessGate};

use serde::Serialize;

/// Health of one launch of a service.
///
/// Starts `Unknown` and moves once, to `Healthy` or `Unhealthy`. A relaunch
/// starts over at `Unknown`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}
