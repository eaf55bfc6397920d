use crate::event_bus::{EventBus, SystemError, SystemEvent};
use crate::health::{HealthState, ReadinessGate};
use crate::plan::ServiceConfig;
use crate::runtime::{ServiceProcess, ServiceProvider};
use crate::supervisor::status::{exit_text, readiness, Readiness, ServiceState, ServiceStatus};
use log::{debug, error, info, warn};
use stack_descriptor::Dependency;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};

/// Shared between the supervisor and its service tasks.
///
/// Tasks launch under the read side of `halted`; the supervisor takes the
/// write side to halt. Once halted, `started` no longer changes.
pub(crate) struct LaunchControl {
    pub halted: RwLock<bool>,
    pub started: Mutex<Vec<String>>,
}

impl LaunchControl {
    pub fn new() -> Self {
        Self {
            halted: RwLock::new(false),
            started: Mutex::new(Vec::new()),
        }
    }

    /// Blocks further launches and returns services in the order they first started.
    pub async fn halt(&self) -> Vec<String> {
        let mut halted = self.halted.write().await;
        *halted = true;
        self.started.lock().await.clone()
    }
}

/// One dependency edge with the dependency's status feed.
pub(crate) struct Upstream {
    pub dependency: Dependency,
    pub status: watch::Receiver<ServiceStatus>,
}

enum Supervised {
    Exited(Option<i32>),
    Stopped(Option<i32>),
}

enum Wake {
    Gate(Option<crate::health::GateOutcome>),
    Exit(anyhow::Result<Option<i32>>),
    Stop,
}

/// Drives one service through its lifecycle: wait, launch, gate, relaunch.
pub(crate) struct ServiceTask<P: ServiceProvider> {
    pub config: ServiceConfig,
    pub runtime: Arc<P>,
    pub event_bus: EventBus,
    pub status: watch::Sender<ServiceStatus>,
    pub control: Arc<LaunchControl>,
    pub restart_delay: Duration,
    pub stop_grace: Duration,
}

impl<P: ServiceProvider + 'static> ServiceTask<P> {
    pub async fn run(self, upstream: Vec<Upstream>, mut stop: watch::Receiver<bool>) {
        let name = self.config.name().to_string();

        if !upstream.is_empty() {
            self.update(|s| s.state = ServiceState::Blocked);
            let waits = upstream
                .into_iter()
                .map(|u| wait_for(&name, u.dependency, u.status));

            let outcome = tokio::select! {
                result = futures::future::try_join_all(waits) => Some(result),
                _ = stop_requested(&mut stop) => None,
            };

            match outcome {
                None => {
                    self.update(|s| s.state = ServiceState::Stopped);
                    return;
                }
                Some(Err(Blocked::Abandoned)) => {
                    debug!("Supervisor: '{}' gave up waiting, dependency stopped", name);
                    self.update(|s| s.state = ServiceState::Stopped);
                    return;
                }
                Some(Err(Blocked::Failed { dependency, reason })) => {
                    warn!(
                        "Supervisor: Skipping '{}': dependency '{}' {}",
                        name,
                        dependency.service(),
                        reason
                    );
                    self.update(|s| {
                        s.state = ServiceState::Skipped;
                        s.detail = Some(format!("dependency '{}' {}", dependency.service(), reason));
                    });
                    self.event_bus.publish(SystemEvent::DependencyFailed {
                        service: name.clone(),
                        dependency: dependency.service().to_string(),
                        condition: dependency.condition(),
                        reason,
                    });
                    return;
                }
                Some(Ok(_)) => {
                    debug!("Supervisor: Dependencies of '{}' satisfied", name);
                }
            }
        }

        let mut restarts = 0u32;
        loop {
            let Some(mut process) = self.launch(&stop).await else {
                return;
            };

            let pid = process.pid();
            self.update(|s| {
                s.state = ServiceState::Running;
                s.health = HealthState::Unknown;
                s.started = true;
                s.pid = pid;
                s.exit_code = None;
                s.restarts = restarts;
                s.detail = None;
            });
            self.event_bus.publish(SystemEvent::ServiceStarted {
                service: name.clone(),
                pid,
            });

            let code = match self.supervise(process.as_mut(), &mut stop).await {
                Supervised::Stopped(code) => {
                    info!("Supervisor: '{}' stopped ({})", name, exit_text(code));
                    self.update(|s| {
                        s.state = ServiceState::Stopped;
                        s.pid = None;
                        s.exit_code = code;
                    });
                    return;
                }
                Supervised::Exited(code) => code,
            };

            self.event_bus.publish(SystemEvent::ServiceExited {
                service: name.clone(),
                exit_code: code,
            });

            let relaunch =
                !*stop.borrow() && self.config.restart().should_restart(code, restarts);
            if !relaunch {
                if code == Some(0) {
                    info!("Supervisor: '{}' exited with code 0", name);
                } else {
                    warn!("Supervisor: '{}' exited with {}", name, exit_text(code));
                }
                self.update(|s| {
                    s.state = ServiceState::Exited;
                    s.pid = None;
                    s.exit_code = code;
                });
                return;
            }

            warn!(
                "Supervisor: '{}' exited with {}, restarting in {} (restart {})",
                name,
                exit_text(code),
                humantime::format_duration(self.restart_delay),
                restarts + 1
            );
            self.update(|s| {
                s.state = ServiceState::Restarting;
                s.health = HealthState::Unknown;
                s.pid = None;
                s.exit_code = code;
            });

            let interrupted = tokio::select! {
                _ = tokio::time::sleep(self.restart_delay) => false,
                _ = stop_requested(&mut stop) => true,
            };
            if interrupted {
                self.update(|s| s.state = ServiceState::Stopped);
                return;
            }
            restarts += 1;
        }
    }

    /// Launches the service unless the run is halting. `None` means this task is done.
    async fn launch(&self, stop: &watch::Receiver<bool>) -> Option<Box<dyn ServiceProcess>> {
        let halted = self.control.halted.read().await;
        if *halted || *stop.borrow() {
            drop(halted);
            self.update(|s| s.state = ServiceState::Stopped);
            return None;
        }

        self.update(|s| s.state = ServiceState::Starting);
        match self.runtime.spawn(&self.config).await {
            Ok(process) => {
                let mut started = self.control.started.lock().await;
                if !started.iter().any(|s| s == self.config.name()) {
                    started.push(self.config.name().to_string());
                }
                Some(process)
            }
            Err(e) => {
                drop(halted);
                error!(
                    "Supervisor: Failed to launch '{}' on the {} runtime: {:#}",
                    self.config.name(),
                    self.runtime.name(),
                    e
                );
                let message = format!("{:#}", e);
                self.update(|s| {
                    s.state = ServiceState::Failed;
                    s.pid = None;
                    s.detail = Some(message.clone());
                });
                self.event_bus.publish(SystemEvent::Error {
                    service: Some(self.config.name().to_string()),
                    error: SystemError::io(message),
                });
                None
            }
        }
    }

    /// Runs the readiness gate alongside the process until it exits or a stop arrives.
    async fn supervise(
        &self,
        process: &mut dyn ServiceProcess,
        stop: &mut watch::Receiver<bool>,
    ) -> Supervised {
        let gate = async {
            let check = self.config.healthcheck()?;
            let readiness_gate =
                ReadinessGate::new(self.config.name(), check.clone(), self.event_bus.clone());
            Some(
                readiness_gate
                    .wait(move || self.runtime.probe(&self.config, check))
                    .await,
            )
        };
        tokio::pin!(gate);
        let mut gated = false;

        loop {
            let wake = tokio::select! {
                outcome = &mut gate, if !gated => Wake::Gate(outcome),
                exit = process.wait() => Wake::Exit(exit),
                _ = stop_requested(stop) => Wake::Stop,
            };

            match wake {
                Wake::Gate(outcome) => {
                    gated = true;
                    if let Some(outcome) = outcome {
                        self.update(|s| {
                            s.health = outcome.health;
                            if outcome.health == HealthState::Healthy {
                                s.state = ServiceState::Healthy;
                            } else {
                                s.state = ServiceState::Unhealthy;
                                s.unhealthy_launches += 1;
                            }
                        });
                    }
                }
                Wake::Exit(result) => {
                    let code = result.unwrap_or_else(|e| {
                        error!(
                            "Supervisor: Lost track of '{}': {:#}",
                            self.config.name(),
                            e
                        );
                        None
                    });
                    return Supervised::Exited(code);
                }
                Wake::Stop => {
                    info!("Supervisor: Stopping '{}'", self.config.name());
                    let code = process.stop(self.stop_grace).await.unwrap_or_else(|e| {
                        error!(
                            "Supervisor: Failed to stop '{}': {:#}",
                            self.config.name(),
                            e
                        );
                        None
                    });
                    return Supervised::Stopped(code);
                }
            }
        }
    }

    /// Applies `change` to the published status and announces the result.
    fn update(&self, change: impl FnOnce(&mut ServiceStatus)) {
        self.status.send_modify(change);
        let status = self.status.borrow().clone();
        debug!(
            "Supervisor: '{}' is {} (health {:?})",
            self.config.name(),
            status.state,
            status.health
        );
        self.event_bus.publish(SystemEvent::StatusChanged {
            service: self.config.name().to_string(),
            status,
        });
    }
}

enum Blocked {
    Failed {
        dependency: Dependency,
        reason: String,
    },
    Abandoned,
}

/// Waits until `dependency` meets its condition, or can no longer meet it.
async fn wait_for(
    service: &str,
    dependency: Dependency,
    mut status: watch::Receiver<ServiceStatus>,
) -> Result<(), Blocked> {
    loop {
        let verdict = readiness(dependency.condition(), &status.borrow_and_update());
        match verdict {
            Readiness::Met => {
                debug!(
                    "Supervisor: '{}' sees '{}' meet {}",
                    service,
                    dependency.service(),
                    dependency.condition()
                );
                return Ok(());
            }
            Readiness::Failed(reason) => return Err(Blocked::Failed { dependency, reason }),
            Readiness::Abandoned => return Err(Blocked::Abandoned),
            Readiness::Pending => {}
        }
        if status.changed().await.is_err() {
            // The dependency's task ended; its last status is final.
            let verdict = readiness(dependency.condition(), &status.borrow());
            return match verdict {
                Readiness::Met => Ok(()),
                Readiness::Failed(reason) => Err(Blocked::Failed { dependency, reason }),
                Readiness::Pending | Readiness::Abandoned => Err(Blocked::Abandoned),
            };
        }
    }
}

/// Resolves once a stop is requested. Never resolves if the sender is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
