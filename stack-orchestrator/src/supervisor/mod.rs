//! Runs a launch plan: one task per service, dependency-ordered startup,
//! readiness gating, restart policies and ordered shutdown.

pub mod report;
pub mod status;
mod task;
pub mod worker;

pub use report::{EndReason, FailedEdge, RunReport};
pub use status::{ServiceState, ServiceStatus};
pub use worker::{Supervisor, SupervisorOptions};
