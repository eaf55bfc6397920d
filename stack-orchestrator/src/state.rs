use crate::event_bus::{EventBus, SystemEvent};
use crate::health::HealthState;
use crate::plan::LaunchPlan;
use crate::supervisor::{FailedEdge, ServiceState};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Default)]
pub struct ServiceView {
    pub state: ServiceState,
    pub health: HealthState,
    pub pid: Option<u32>,
    pub restarts: u32,
    pub last_exit_code: Option<i32>,
    /// Attempts made by the current launch's probe.
    pub probe_attempts: u32,
    pub last_probe_ok: Option<bool>,
    pub depends_on: Vec<String>,
    pub detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Read model of a run, fed from the event bus and served over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct StackView {
    pub project: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub layers: Vec<Vec<String>>,
    pub services: BTreeMap<String, ServiceView>, // Key: service name
    pub failed_edges: Vec<FailedEdge>,
}

impl StackView {
    pub fn new(plan: &LaunchPlan) -> Self {
        let services = plan
            .services()
            .iter()
            .map(|(name, config)| {
                let view = ServiceView {
                    depends_on: config
                        .depends_on()
                        .iter()
                        .map(|d| d.service().to_string())
                        .collect(),
                    ..Default::default()
                };
                (name.clone(), view)
            })
            .collect();

        Self {
            project: plan.project().to_string(),
            run_id: plan.run_id(),
            started_at: Utc::now(),
            layers: plan.layers().to_vec(),
            services,
            failed_edges: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: &SystemEvent) {
        if let SystemEvent::DependencyFailed {
            service,
            dependency,
            condition,
            reason,
        } = event
        {
            self.failed_edges.push(FailedEdge {
                service: service.clone(),
                dependency: dependency.clone(),
                condition: *condition,
                reason: reason.clone(),
            });
        }

        let Some(view) = event.service().and_then(|s| self.services.get_mut(s)) else {
            return;
        };
        let now = Utc::now();
        view.updated_at = Some(now);

        match event {
            SystemEvent::StatusChanged { status, .. } => {
                view.state = status.state;
                view.health = status.health;
                view.pid = status.pid;
                view.restarts = status.restarts;
                view.last_exit_code = status.exit_code.or(view.last_exit_code);
                if status.detail.is_some() {
                    view.detail = status.detail.clone();
                }
            }
            SystemEvent::ServiceStarted { pid, .. } => {
                view.pid = *pid;
                view.started_at = Some(now);
                view.probe_attempts = 0;
                view.last_probe_ok = None;
            }
            SystemEvent::ServiceExited { exit_code, .. } => {
                view.pid = None;
                view.last_exit_code = *exit_code;
            }
            SystemEvent::ProbeAttempt {
                attempt, success, ..
            } => {
                view.probe_attempts = *attempt;
                view.last_probe_ok = Some(*success);
            }
            SystemEvent::HealthChanged { health, .. } => view.health = *health,
            SystemEvent::DependencyFailed {
                dependency, reason, ..
            } => {
                view.detail = Some(format!("dependency '{}' {}", dependency, reason));
            }
            SystemEvent::Error { error, .. } => view.detail = Some(error.to_string()),
        }
    }
}

pub type SharedStackState = Arc<RwLock<StackView>>;

pub fn create_state(plan: &LaunchPlan) -> SharedStackState {
    Arc::new(RwLock::new(StackView::new(plan)))
}

/// A copy of the current view. A writer that panicked leaves the last complete update.
pub fn snapshot(state: &SharedStackState) -> StackView {
    state.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Keeps `state` current from `event_bus` until the bus closes.
pub fn track(state: SharedStackState, event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let mut view = state.write().unwrap_or_else(|e| e.into_inner());
                    view.apply(&event);
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("State: Status view missed {} events", missed);
                }
                Err(RecvError::Closed) => {
                    debug!("State: Event bus closed, tracker exiting");
                    break;
                }
            }
        }
    })
}
