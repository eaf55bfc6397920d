use crate::plan::{LaunchPlan, ServiceConfig};
use anyhow::Result;
use async_trait::async_trait;
use stack_descriptor::HealthCheckSpec;
use std::time::Duration;

/// How services are actually run.
/// Implement this for host processes, containers, remote hosts, etc.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Creates what the plan needs before any service starts:
    /// named volumes, the service network, locally built images.
    async fn prepare(&self, plan: &LaunchPlan) -> Result<()>;

    /// Launches one instance of the service.
    /// Returns once the process exists; it does not wait for readiness.
    async fn spawn(&self, service: &ServiceConfig) -> Result<Box<dyn ServiceProcess>>;

    /// Runs one probe attempt against a running service.
    /// `Ok(false)` is a non-zero exit, `Err` means the probe could not be launched.
    /// Dropping the returned future must kill the probe.
    async fn probe(&self, service: &ServiceConfig, check: &HealthCheckSpec) -> Result<bool>;

    /// Removes per-run resources and, when `remove_volumes` is set, named volumes.
    async fn teardown(&self, plan: &LaunchPlan, remove_volumes: bool) -> Result<()>;
}

/// A launched service instance.
#[async_trait]
pub trait ServiceProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Waits for the process to end. Returns the exit code, `None` if killed by a signal.
    /// Must be cancel safe: the supervisor races it against stop requests.
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Asks the process to terminate, then kills it once `grace` has passed.
    async fn stop(&mut self, grace: Duration) -> Result<Option<i32>>;
}
