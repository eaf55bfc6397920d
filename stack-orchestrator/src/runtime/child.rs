use crate::runtime::traits::ServiceProcess;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// A service running as a direct child of the orchestrator.
///
/// The child leads its own process group, so a terminal Ctrl-C reaches only
/// the orchestrator, which then stops services in order. Signals go to the
/// whole group so `sh -c` wrappers take their children down with them.
pub struct ChildProcess {
    service: String,
    child: Child,
}

impl ChildProcess {
    pub fn spawn(service: &str, mut command: Command) -> Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .process_group(0);

        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn process for '{}'", service))?;
        Ok(Self {
            service: service.to_string(),
            child,
        })
    }

    fn signal(&self, signal: libc::c_int) -> bool {
        let Some(pid) = self.child.id() else {
            return false;
        };
        unsafe { libc::kill(-(pid as libc::pid_t), signal) == 0 }
    }
}

#[async_trait]
impl ServiceProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self
            .child
            .wait()
            .await
            .with_context(|| format!("Failed to wait for '{}'", self.service))?;
        Ok(status.code())
    }

    async fn stop(&mut self, grace: Duration) -> Result<Option<i32>> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status.code());
        }

        if !self.signal(libc::SIGTERM) {
            warn!(
                "Runtime: Failed to send SIGTERM to '{}': {}",
                self.service,
                std::io::Error::last_os_error()
            );
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(status?.code()),
            Err(_) => {
                info!(
                    "Runtime: '{}' still running after {:?}, killing",
                    self.service, grace
                );
                self.signal(libc::SIGKILL);
                self.child.kill().await.ok();
                let status = self.child.wait().await?;
                Ok(status.code())
            }
        }
    }
}
