use crate::health::HealthState;
use serde::Serialize;
use stack_descriptor::DependencyCondition;
use std::fmt;

/// Lifecycle of one service within a run.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Not looked at yet.
    #[default]
    Pending,
    /// Waiting for dependencies to reach their conditions.
    Blocked,
    /// Launch in progress.
    Starting,
    /// Launched; no probe verdict (or no probe).
    Running,
    Healthy,
    /// The probe gave up. The process may still be running.
    Unhealthy,
    /// Ended on its own and will not be relaunched.
    Exited,
    /// Ended on its own; relaunch pending.
    Restarting,
    /// A dependency can never satisfy its condition.
    Skipped,
    /// The runtime could not launch it.
    Failed,
    /// Stopped by the orchestrator.
    Stopped,
}

impl ServiceState {
    /// States that end the run when abort-on-failure is on.
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, Self::Unhealthy | Self::Skipped | Self::Failed)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Exited => "exited",
            Self::Restarting => "restarting",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// What a service worker publishes on its watch channel.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// Health of the current launch.
    pub health: HealthState,
    /// Launched at least once in this run.
    pub started: bool,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub exit_code: Option<i32>,
    /// Launches whose probe ended unhealthy. Health gating never recovers from one.
    pub unhealthy_launches: u32,
    /// Last error or reason, for display.
    pub detail: Option<String>,
}

/// Where a dependency stands with respect to the condition a dependent needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Met,
    Pending,
    /// Can never be met in this run.
    Failed(String),
    /// Stopped by the orchestrator before the condition was met.
    Abandoned,
}

/// Evaluates `condition` against a dependency's current status.
pub fn readiness(condition: DependencyCondition, status: &ServiceStatus) -> Readiness {
    match condition {
        DependencyCondition::ServiceStarted => {
            if status.started {
                return Readiness::Met;
            }
            match status.state {
                ServiceState::Failed => Readiness::Failed(format!(
                    "failed to start{}",
                    detail_suffix(status)
                )),
                ServiceState::Skipped => {
                    Readiness::Failed("was skipped after its own dependency failed".to_string())
                }
                ServiceState::Stopped => Readiness::Abandoned,
                _ => Readiness::Pending,
            }
        }
        DependencyCondition::ServiceHealthy => {
            if status.unhealthy_launches > 0 || status.health == HealthState::Unhealthy {
                return Readiness::Failed("is unhealthy".to_string());
            }
            if status.health == HealthState::Healthy {
                return Readiness::Met;
            }
            match status.state {
                ServiceState::Failed => Readiness::Failed(format!(
                    "failed to start{}",
                    detail_suffix(status)
                )),
                ServiceState::Skipped => {
                    Readiness::Failed("was skipped after its own dependency failed".to_string())
                }
                ServiceState::Exited => Readiness::Failed(format!(
                    "exited with {} before becoming healthy",
                    exit_text(status.exit_code)
                )),
                ServiceState::Stopped => Readiness::Abandoned,
                _ => Readiness::Pending,
            }
        }
    }
}

fn detail_suffix(status: &ServiceStatus) -> String {
    status
        .detail
        .as_ref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

pub(crate) fn exit_text(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "a signal".to_string(),
    }
}
