use crate::plan::{BuildConfig, LaunchPlan, ServiceConfig};
use crate::runtime::child::ChildProcess;
use crate::runtime::traits::{ServiceProcess, ServiceProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use stack_descriptor::HealthCheckSpec;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs services as containers through the `docker` CLI.
///
/// `spawn` creates the container first (pulling its image if needed) and
/// only then starts it attached (`docker start -a`). The attached client
/// lives exactly as long as the container and its exit code is the
/// container's, and probes never run against a container that does not
/// exist yet.
pub struct DockerServiceProvider {
    binary: String,
}

impl DockerServiceProvider {
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs a short docker command to completion, failing on a non-zero exit.
    async fn run(&self, args: &[String]) -> Result<()> {
        debug!("Runtime: {} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to run '{} {}'", self.binary, args.join(" ")))?;
        if !output.status.success() {
            anyhow::bail!(
                "'{} {}' failed ({}): {}",
                self.binary,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    /// Like `run`, with the command's output shown to the operator.
    async fn run_visible(&self, args: &[String]) -> Result<()> {
        let status = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .await
            .with_context(|| format!("Failed to run '{} {}'", self.binary, args.join(" ")))?;
        if !status.success() {
            anyhow::bail!("'{} {}' failed ({})", self.binary, args.join(" "), status);
        }
        Ok(())
    }

    /// Pulls `image` unless it is already present locally.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.run(&args(["image", "inspect", image])).await.is_ok() {
            debug!("Runtime: Image '{}' already present", image);
            return Ok(());
        }
        info!("Runtime: Pulling '{}'", image);
        self.run_visible(&args(["pull", image])).await
    }
}

impl Default for DockerServiceProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceProvider for DockerServiceProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn prepare(&self, plan: &LaunchPlan) -> Result<()> {
        if self
            .run(&args(["network", "inspect", plan.network()]))
            .await
            .is_err()
        {
            self.run(&args(["network", "create", plan.network()]))
                .await
                .context("Failed to create the service network")?;
            info!("Runtime: Created network '{}'", plan.network());
        }

        for volume in plan.volumes() {
            self.run(&args(["volume", "create", volume.runtime_name()]))
                .await
                .with_context(|| format!("Failed to create volume '{}'", volume.name()))?;
            info!(
                "Runtime: Volume '{}' ready as '{}'",
                volume.name(),
                volume.runtime_name()
            );
        }

        for service in plan.services().values() {
            if let Some(build) = service.build() {
                info!(
                    "Runtime: Building '{}' from {}",
                    build.tag(),
                    build.context().display()
                );
                self.run_visible(&build_args(build))
                    .await
                    .with_context(|| format!("Failed to build image for '{}'", service.name()))?;
            } else if let Some(image) = service.image() {
                self.ensure_image(image)
                    .await
                    .with_context(|| format!("Failed to pull image for '{}'", service.name()))?;
            }
        }
        Ok(())
    }

    async fn spawn(&self, service: &ServiceConfig) -> Result<Box<dyn ServiceProcess>> {
        // A container left over from an earlier run would hold the name.
        if let Err(e) = self
            .run(&args(["rm", "-f", service.container_name()]))
            .await
        {
            debug!("Runtime: No stale container to clear: {:#}", e);
        }

        let create = create_args(service)?;
        self.run(&create)
            .await
            .with_context(|| format!("Failed to create container for '{}'", service.name()))?;
        info!(
            "Runtime: Starting '{}' as container '{}'",
            service.name(),
            service.container_name()
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(start_args(service.container_name()));
        let child = ChildProcess::spawn(service.name(), cmd)?;

        Ok(Box::new(ContainerProcess {
            binary: self.binary.clone(),
            container: service.container_name().to_string(),
            child,
        }))
    }

    async fn probe(&self, service: &ServiceConfig, check: &HealthCheckSpec) -> Result<bool> {
        // Killing the exec client on timeout leaves the in-container command to finish on its own.
        let status = Command::new(&self.binary)
            .args(exec_args(service, check))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to launch probe for '{}'", service.name()))?;
        Ok(status.success())
    }

    async fn teardown(&self, plan: &LaunchPlan, remove_volumes: bool) -> Result<()> {
        let mut failures = Vec::new();

        for service in plan.services().values() {
            // Usually already gone thanks to --rm.
            if let Err(e) = self
                .run(&args(["rm", "-f", service.container_name()]))
                .await
            {
                debug!("Runtime: {:#}", e);
            }
        }

        if let Err(e) = self.run(&args(["network", "rm", plan.network()])).await {
            warn!("Runtime: Could not remove network '{}': {:#}", plan.network(), e);
        }

        if remove_volumes {
            for volume in plan.volumes() {
                match self
                    .run(&args(["volume", "rm", volume.runtime_name()]))
                    .await
                {
                    Ok(()) => info!("Runtime: Removed volume '{}'", volume.runtime_name()),
                    Err(e) => failures.push(format!("{}: {:#}", volume.runtime_name(), e)),
                }
            }
        }

        if !failures.is_empty() {
            anyhow::bail!("Failed to remove volumes: {}", failures.join("; "));
        }
        Ok(())
    }
}

/// The attached `docker start -a` client for one container.
struct ContainerProcess {
    binary: String,
    container: String,
    child: ChildProcess,
}

#[async_trait]
impl ServiceProcess for ContainerProcess {
    fn pid(&self) -> Option<u32> {
        self.child.pid()
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        self.child.wait().await
    }

    async fn stop(&mut self, grace: Duration) -> Result<Option<i32>> {
        let stop = Command::new(&self.binary)
            .args(stop_args(&self.container, grace))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        match stop {
            Ok(output) if output.status.success() => self.child.wait().await,
            Ok(output) => {
                warn!(
                    "Runtime: 'docker stop {}' failed: {}",
                    self.container,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                self.child.stop(grace).await
            }
            Err(e) => {
                warn!("Runtime: Could not run 'docker stop {}': {}", self.container, e);
                self.child.stop(grace).await
            }
        }
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Arguments for `docker create`. The container is removed once it stops.
pub fn create_args(service: &ServiceConfig) -> Result<Vec<String>> {
    let image = service
        .image()
        .with_context(|| format!("Service '{}' has no image to run", service.name()))?;

    let mut run = args(["create", "--rm", "--name", service.container_name()]);
    if let Some(network) = service.network() {
        run.extend(args(["--network", network, "--network-alias", service.name()]));
    }
    for (key, value) in service.env() {
        run.push("-e".to_string());
        run.push(format!("{}={}", key, value));
    }
    for port in service.ports() {
        run.push("-p".to_string());
        run.push(port.to_string());
    }
    for mount in service.mounts() {
        run.push("-v".to_string());
        run.push(mount.to_volume_arg());
    }
    if let Some(dir) = service.working_dir() {
        run.extend(args(["-w", dir]));
    }
    run.push(image.to_string());
    if let Some(command) = service.command() {
        run.extend(command.iter().cloned());
    }
    Ok(run)
}

/// Arguments for `docker start`, attached to the container's output and exit code.
pub fn start_args(container: &str) -> Vec<String> {
    args(["start", "-a", container])
}

/// Arguments for `docker exec` running the probe inside the service container.
pub fn exec_args(service: &ServiceConfig, check: &HealthCheckSpec) -> Vec<String> {
    let mut exec = args(["exec", service.container_name()]);
    exec.extend(check.test().iter().cloned());
    exec
}

/// Arguments for `docker build`. A relative `dockerfile` is taken from the context.
pub fn build_args(build: &BuildConfig) -> Vec<String> {
    let mut out = args(["build", "-t", build.tag()]);
    if let Some(dockerfile) = build.dockerfile() {
        let path = build.context().join(dockerfile);
        out.push("-f".to_string());
        out.push(path.display().to_string());
    }
    out.push(build.context().display().to_string());
    out
}

pub fn stop_args(container: &str, grace: Duration) -> Vec<String> {
    let secs = grace.as_secs().max(1).to_string();
    args(["stop", "-t", secs.as_str(), container])
}
