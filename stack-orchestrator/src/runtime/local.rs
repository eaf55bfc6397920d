use crate::plan::{LaunchPlan, MountSource, ServiceConfig, VolumeConfig};
use crate::runtime::child::ChildProcess;
use crate::runtime::traits::{ServiceProcess, ServiceProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use stack_descriptor::HealthCheckSpec;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

/// Runs each service's `command` as a process on this machine.
///
/// Named volumes become directories under `<data_dir>/volumes`. They outlive
/// runs until `teardown` is asked to remove them. A host process cannot see
/// them at the mount target, so each mounted volume's directory is passed in
/// the environment as `STACK_VOLUME_<NAME>` (see [`volume_env_var`]).
pub struct LocalServiceProvider {
    data_dir: PathBuf,
}

impl LocalServiceProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn volume_dir(&self, volume: &VolumeConfig) -> PathBuf {
        self.runtime_dir(volume.runtime_name())
    }

    fn runtime_dir(&self, runtime_name: &str) -> PathBuf {
        self.data_dir.join("volumes").join(runtime_name)
    }

    /// Directories of the named volumes `service` mounts, keyed by variable name.
    pub fn volume_env(&self, service: &ServiceConfig) -> BTreeMap<String, String> {
        service
            .mounts()
            .iter()
            .filter_map(|mount| match mount.source() {
                MountSource::Volume { name, runtime_name } => Some((
                    volume_env_var(name),
                    self.runtime_dir(runtime_name).display().to_string(),
                )),
                _ => None,
            })
            .collect()
    }

    /// The declared environment wins over the volume variables.
    fn command(&self, argv: &[String], service: &ServiceConfig) -> Result<Command> {
        let (program, args) = argv
            .split_first()
            .with_context(|| format!("Empty command for '{}'", service.name()))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(self.volume_env(service))
            .envs(service.env())
            .current_dir(service.host_dir());
        Ok(cmd)
    }
}

#[async_trait]
impl ServiceProvider for LocalServiceProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn prepare(&self, plan: &LaunchPlan) -> Result<()> {
        for volume in plan.volumes() {
            let dir = self.volume_dir(volume);
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create volume directory {}", dir.display()))?;
            info!(
                "Runtime: Volume '{}' ready at {}",
                volume.name(),
                dir.display()
            );
        }
        Ok(())
    }

    async fn spawn(&self, service: &ServiceConfig) -> Result<Box<dyn ServiceProcess>> {
        let argv = service.command().with_context(|| {
            format!(
                "Service '{}' has no 'command' to run locally",
                service.name()
            )
        })?;
        info!("Runtime: Spawning '{}': {:?}", service.name(), argv);

        let process = ChildProcess::spawn(service.name(), self.command(argv, service)?)?;
        Ok(Box::new(process))
    }

    async fn probe(&self, service: &ServiceConfig, check: &HealthCheckSpec) -> Result<bool> {
        let mut cmd = self.command(check.test(), service)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let status = cmd
            .status()
            .await
            .with_context(|| format!("Failed to launch probe for '{}'", service.name()))?;
        debug!("Runtime: Probe for '{}' exited with {}", service.name(), status);
        Ok(status.success())
    }

    async fn teardown(&self, plan: &LaunchPlan, remove_volumes: bool) -> Result<()> {
        if !remove_volumes {
            return Ok(());
        }
        for volume in plan.volumes() {
            let dir = self.volume_dir(volume);
            if dir.exists() {
                tokio::fs::remove_dir_all(&dir)
                    .await
                    .with_context(|| format!("Failed to remove volume {}", dir.display()))?;
                info!("Runtime: Removed volume '{}'", volume.name());
            }
        }
        Ok(())
    }
}

/// `pg-data` becomes `STACK_VOLUME_PG_DATA`.
pub fn volume_env_var(volume: &str) -> String {
    let name: String = volume
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("STACK_VOLUME_{}", name)
}
