//! # Event Bus
//!
//! Every change a service worker makes is published here. The supervisor
//! listens to notice startup failures, the status view listens to keep its
//! snapshot current, and nothing calls across components directly.

use crate::health::HealthState;
use crate::supervisor::ServiceStatus;
use stack_descriptor::DependencyCondition;
use tokio::sync::broadcast;

/// Something that happened to a service during a run.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// **Worker**: the full status after any change.
    StatusChanged {
        service: String,
        status: ServiceStatus,
    },

    /// **Worker**: the process was launched.
    ServiceStarted { service: String, pid: Option<u32> },

    /// **Worker**: the process ended on its own. `None` means killed by a signal.
    ServiceExited {
        service: String,
        exit_code: Option<i32>,
    },

    /// **Gate**: one probe attempt finished.
    ProbeAttempt {
        service: String,
        attempt: u32,
        retries: u32,
        success: bool,
    },

    /// **Gate**: the probe reached a verdict.
    HealthChanged { service: String, health: HealthState },

    /// **Worker**: a dependency can never satisfy its condition; `service` will not start.
    DependencyFailed {
        service: String,
        dependency: String,
        condition: DependencyCondition,
        reason: String,
    },

    /// **System**: use this to report non-fatal or fatal errors in components.
    Error {
        service: Option<String>,
        error: SystemError,
    },
}

impl SystemEvent {
    /// The service this event is about, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::StatusChanged { service, .. }
            | Self::ServiceStarted { service, .. }
            | Self::ServiceExited { service, .. }
            | Self::ProbeAttempt { service, .. }
            | Self::HealthChanged { service, .. }
            | Self::DependencyFailed { service, .. } => Some(service),
            Self::Error { service, .. } => service.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemError {
    /// IO-related errors (process launch, file system, runtime CLI).
    Io(String),
    /// Unexpected crashes or logic errors.
    Fatal(String),
}

impl SystemError {
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}

impl std::fmt::Display for SystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "io: {}", msg),
            Self::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

/// A wrapper around a tokio broadcast channel.
///
/// Subscribers that fall behind skip old events (`Lagged`); anything that
/// must not be missed is also readable from the per-service watch channels.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    pub fn publish(&self, event: SystemEvent) {
        // No subscribers is fine (e.g. `plan` runs without a status view).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
