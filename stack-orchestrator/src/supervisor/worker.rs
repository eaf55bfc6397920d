use crate::config::OrchestratorConfig;
use crate::event_bus::{EventBus, SystemEvent};
use crate::plan::LaunchPlan;
use crate::runtime::ServiceProvider;
use crate::supervisor::report::{EndReason, RunReport};
use crate::supervisor::status::ServiceStatus;
use crate::supervisor::task::{LaunchControl, ServiceTask, Upstream};
use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Pause before relaunching a service its restart policy brings back.
    pub restart_delay: Duration,
    /// How long a stopped service gets between SIGTERM and SIGKILL.
    pub stop_grace: Duration,
    /// End the run as soon as any service fails to launch, turns unhealthy,
    /// or is skipped.
    pub abort_on_failure: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(1),
            stop_grace: Duration::from_secs(10),
            abort_on_failure: true,
        }
    }
}

impl From<&OrchestratorConfig> for SupervisorOptions {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            restart_delay: config.restart_delay,
            stop_grace: config.stop_grace,
            abort_on_failure: config.abort_on_failure,
        }
    }
}

enum Wake {
    Cancel(bool),
    Done(Option<String>),
    Event(std::result::Result<SystemEvent, RecvError>),
}

/// Brings a launch plan up and takes it down again.
///
/// Every service gets its own task. A task waits until each dependency meets
/// its condition, launches the service, and runs its readiness gate. Services
/// with no edge between them start concurrently.
///
/// Use `Supervisor::new(...)` to create it, and `supervisor.run(cancel)` to
/// drive a run to completion.
pub struct Supervisor<P: ServiceProvider> {
    plan: LaunchPlan,
    runtime: Arc<P>,
    event_bus: EventBus,
    options: SupervisorOptions,
}

impl<P: ServiceProvider + 'static> Supervisor<P> {
    pub fn new(
        plan: LaunchPlan,
        runtime: Arc<P>,
        event_bus: EventBus,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            plan,
            runtime,
            event_bus,
            options,
        }
    }

    /// Runs the plan until `cancel` turns true, every service has ended, or
    /// (with `abort_on_failure`) a startup failure occurs. Then stops started
    /// services in reverse start order and releases per-run resources.
    ///
    /// Only a failure to prepare runtime resources is an `Err`; service
    /// failures are in the report.
    pub async fn run(self, mut cancel: watch::Receiver<bool>) -> Result<RunReport> {
        let started_at = Utc::now();
        info!(
            "Supervisor: Starting '{}' (run {}) on the {} runtime, layers {:?}",
            self.plan.project(),
            self.plan.run_id(),
            self.runtime.name(),
            self.plan.layers()
        );

        self.runtime
            .prepare(&self.plan)
            .await
            .with_context(|| format!("Failed to prepare resources for '{}'", self.plan.project()))?;

        let mut events = self.event_bus.subscribe();
        let control = Arc::new(LaunchControl::new());

        // Build every task before spawning any, so a bad plan launches nothing.
        let mut senders = BTreeMap::new();
        let mut statuses = BTreeMap::new();
        for name in self.plan.order() {
            let (tx, rx) = watch::channel(ServiceStatus::default());
            senders.insert(name.clone(), tx);
            statuses.insert(name.clone(), rx);
        }

        let mut tasks = Vec::new();
        for name in self.plan.order() {
            let config = self
                .plan
                .service(name)
                .cloned()
                .with_context(|| format!("Plan lists '{}' but has no config for it", name))?;
            let upstream = config
                .depends_on()
                .iter()
                .map(|dependency| {
                    let status = statuses.get(dependency.service()).cloned().with_context(|| {
                        format!(
                            "'{}' depends on '{}', which is not in the plan",
                            name,
                            dependency.service()
                        )
                    })?;
                    Ok(Upstream {
                        dependency: dependency.clone(),
                        status,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let status = senders
                .remove(name)
                .with_context(|| format!("Duplicate service '{}' in plan order", name))?;

            tasks.push((
                name.clone(),
                ServiceTask {
                    config,
                    runtime: self.runtime.clone(),
                    event_bus: self.event_bus.clone(),
                    status,
                    control: control.clone(),
                    restart_delay: self.options.restart_delay,
                    stop_grace: self.options.stop_grace,
                },
                upstream,
            ));
        }

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut stops: BTreeMap<String, watch::Sender<bool>> = BTreeMap::new();
        let mut handles: BTreeMap<String, JoinHandle<()>> = BTreeMap::new();
        for (name, task, upstream) in tasks {
            let (stop_tx, stop_rx) = watch::channel(false);
            let done = done_tx.clone();
            let service = name.clone();
            let handle = tokio::spawn(async move {
                task.run(upstream, stop_rx).await;
                let _ = done.send(service);
            });
            stops.insert(name.clone(), stop_tx);
            handles.insert(name, handle);
        }
        drop(done_tx);

        let reason = self
            .monitor(&mut cancel, &mut events, &mut done_rx, &statuses, handles.len())
            .await;

        // --- Teardown ---
        let start_order = control.halt().await;
        info!(
            "Supervisor: Shutting down '{}' ({}), stopping {:?} in reverse",
            self.plan.project(),
            reason,
            start_order
        );

        // Never-started tasks hold no process; release them first.
        for (name, stop) in &stops {
            if !start_order.contains(name) {
                stop.send_replace(true);
            }
        }
        let idle: Vec<String> = handles
            .keys()
            .filter(|name| !start_order.contains(*name))
            .cloned()
            .collect();
        for name in idle {
            if let Some(handle) = handles.remove(&name) {
                join(&name, handle).await;
            }
        }

        for name in start_order.iter().rev() {
            if let Some(stop) = stops.get(name) {
                stop.send_replace(true);
            }
            if let Some(handle) = handles.remove(name) {
                join(name, handle).await;
            }
        }

        if let Err(e) = self.runtime.teardown(&self.plan, false).await {
            warn!("Supervisor: Teardown of '{}' incomplete: {:#}", self.plan.project(), e);
        }

        let services = statuses
            .iter()
            .map(|(name, rx)| (name.clone(), rx.borrow().clone()))
            .collect();
        let report = RunReport::new(&self.plan, reason, started_at, start_order, services);
        if report.has_failures() {
            warn!("Supervisor: Run {} ended with failures", report.run_id);
            for edge in &report.failed_edges {
                warn!("Supervisor: Unmet dependency {}", edge);
            }
        } else {
            info!("Supervisor: Run {} ended cleanly", report.run_id);
        }
        Ok(report)
    }

    /// Waits for a reason to end the run.
    async fn monitor(
        &self,
        cancel: &mut watch::Receiver<bool>,
        events: &mut tokio::sync::broadcast::Receiver<SystemEvent>,
        done: &mut mpsc::UnboundedReceiver<String>,
        statuses: &BTreeMap<String, watch::Receiver<ServiceStatus>>,
        total: usize,
    ) -> EndReason {
        let mut finished = 0usize;
        let mut cancel_open = true;
        let mut events_open = true;

        loop {
            if *cancel.borrow() {
                info!("Supervisor: Shutdown requested");
                return EndReason::Cancelled;
            }
            if self.options.abort_on_failure {
                if let Some(service) = first_failure(self.plan.order(), statuses) {
                    error!("Supervisor: '{}' failed to come up, aborting the run", service);
                    return EndReason::StartupFailure { service };
                }
            }
            if finished >= total {
                info!("Supervisor: All services have ended");
                return EndReason::AllTerminated;
            }

            let wake = tokio::select! {
                changed = cancel.changed(), if cancel_open => Wake::Cancel(changed.is_ok()),
                service = done.recv() => Wake::Done(service),
                event = events.recv(), if events_open => Wake::Event(event),
            };

            match wake {
                Wake::Cancel(open) => cancel_open = open,
                Wake::Done(Some(service)) => {
                    finished += 1;
                    debug!(
                        "Supervisor: Task for '{}' finished ({}/{})",
                        service, finished, total
                    );
                }
                Wake::Done(None) => finished = total,
                Wake::Event(Ok(event)) => {
                    if let SystemEvent::Error { service, error } = &event {
                        warn!("Supervisor: Error reported for {:?}: {}", service, error);
                    }
                }
                Wake::Event(Err(RecvError::Lagged(missed))) => {
                    debug!("Supervisor: Event stream lagged by {} events", missed);
                }
                Wake::Event(Err(RecvError::Closed)) => events_open = false,
            }
        }
    }
}

/// First service, in plan order, in a state that counts as a startup failure.
fn first_failure(
    order: &[String],
    statuses: &BTreeMap<String, watch::Receiver<ServiceStatus>>,
) -> Option<String> {
    order
        .iter()
        .find(|name| {
            statuses
                .get(*name)
                .map_or(false, |rx| rx.borrow().state.is_startup_failure())
        })
        .cloned()
}

async fn join(service: &str, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!("Supervisor: Task for '{}' panicked: {}", service, e);
    }
}
