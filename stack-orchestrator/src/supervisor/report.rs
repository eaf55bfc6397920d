use crate::health::HealthState;
use crate::plan::LaunchPlan;
use crate::supervisor::status::{readiness, Readiness, ServiceState, ServiceStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use stack_descriptor::DependencyCondition;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Why the supervisor stopped the run.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndReason {
    /// The operator asked for shutdown.
    Cancelled,
    /// Every service reached a final state on its own.
    AllTerminated,
    /// A service failed to start or turned unhealthy, and the run was set to abort on that.
    StartupFailure { service: String },
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::AllTerminated => f.write_str("all services ended"),
            Self::StartupFailure { service } => write!(f, "startup failure in '{}'", service),
        }
    }
}

/// A dependency edge whose condition could never be met.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct FailedEdge {
    /// The dependent that did not start.
    pub service: String,
    pub dependency: String,
    pub condition: DependencyCondition,
    pub reason: String,
}

impl fmt::Display for FailedEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}): {}",
            self.service, self.dependency, self.condition, self.reason
        )
    }
}

/// Outcome of one `up` run.
#[derive(Serialize, Debug, Clone)]
pub struct RunReport {
    pub project: String,
    pub run_id: Uuid,
    pub reason: EndReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Services in the order they first launched.
    pub start_order: Vec<String>,
    pub services: BTreeMap<String, ServiceStatus>,
    pub failed_edges: Vec<FailedEdge>,
}

impl RunReport {
    pub(crate) fn new(
        plan: &LaunchPlan,
        reason: EndReason,
        started_at: DateTime<Utc>,
        start_order: Vec<String>,
        services: BTreeMap<String, ServiceStatus>,
    ) -> Self {
        let failed_edges = failed_edges(plan, &services);
        Self {
            project: plan.project().to_string(),
            run_id: plan.run_id(),
            reason,
            started_at,
            finished_at: Utc::now(),
            start_order,
            services,
            failed_edges,
        }
    }

    /// True when any service failed to launch, any probe gave up,
    /// or any dependent was held back by a failed dependency.
    pub fn has_failures(&self) -> bool {
        matches!(self.reason, EndReason::StartupFailure { .. })
            || !self.failed_edges.is_empty()
            || self.services.values().any(|s| {
                s.state == ServiceState::Failed
                    || s.state == ServiceState::Skipped
                    || s.unhealthy_launches > 0
            })
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Run {} of '{}' ended: {} ({}s)",
            self.run_id,
            self.project,
            self.reason,
            (self.finished_at - self.started_at).num_seconds()
        )?;
        for (name, status) in &self.services {
            let health = match status.health {
                HealthState::Unknown => "-",
                HealthState::Healthy => "healthy",
                HealthState::Unhealthy => "unhealthy",
            };
            write!(
                f,
                "  {:<16} {:<11} health={:<9} restarts={}",
                name,
                status.state.to_string(),
                health,
                status.restarts
            )?;
            if let Some(code) = status.exit_code {
                write!(f, " exit={}", code)?;
            }
            if let Some(detail) = &status.detail {
                write!(f, " ({})", detail)?;
            }
            writeln!(f)?;
        }
        if !self.failed_edges.is_empty() {
            writeln!(f, "Unmet dependencies:")?;
            for edge in &self.failed_edges {
                writeln!(f, "  {}", edge)?;
            }
        }
        Ok(())
    }
}

/// Edges of never-started services whose dependency ended up unable to meet the condition.
///
/// Dependencies stopped by the orchestrator before they could answer are not failures.
fn failed_edges(plan: &LaunchPlan, services: &BTreeMap<String, ServiceStatus>) -> Vec<FailedEdge> {
    let mut edges = Vec::new();
    for name in plan.order() {
        let Some(config) = plan.service(name) else {
            continue;
        };
        if services.get(name).map_or(false, |s| s.started) {
            continue;
        }
        for dependency in config.depends_on() {
            let Some(status) = services.get(dependency.service()) else {
                continue;
            };
            if let Readiness::Failed(reason) = readiness(dependency.condition(), status) {
                edges.push(FailedEdge {
                    service: name.clone(),
                    dependency: dependency.service().to_string(),
                    condition: dependency.condition(),
                    reason,
                });
            }
        }
    }
    edges
}
