use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Which [`ServiceProvider`](crate::runtime::ServiceProvider) runs the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Host processes built from each service's `command`.
    Local,
    /// Containers driven through the `docker` CLI.
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Descriptor file. Relative paths inside it resolve against its directory.
    pub descriptor_path: PathBuf,
    /// Overrides the descriptor's `name` and the directory-name fallback.
    pub project_name: Option<String>,
    pub runtime: RuntimeKind,

    /// Where the local runtime keeps named volumes. Defaults to `.stack` next to the descriptor.
    pub data_dir: Option<PathBuf>,

    /// Serve the status API on this port when set.
    pub status_port: Option<u16>,

    pub restart_delay: Duration,
    /// How long a stopped service gets between SIGTERM and kill.
    pub stop_grace: Duration,
    /// End the run on the first startup failure.
    pub abort_on_failure: bool,
}

impl OrchestratorConfig {
    /// The directory the descriptor lives in.
    pub fn root_dir(&self) -> PathBuf {
        match self.descriptor_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.root_dir().join(".stack"))
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            descriptor_path: PathBuf::from("compose.yaml"),
            project_name: None,
            runtime: RuntimeKind::Docker,
            data_dir: None,
            status_port: None,
            restart_delay: Duration::from_secs(1),
            stop_grace: Duration::from_secs(10),
            abort_on_failure: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_defaults_next_to_descriptor() {
        let config = OrchestratorConfig {
            descriptor_path: PathBuf::from("deploy/compose.yaml"),
            ..Default::default()
        };
        assert_eq!(config.root_dir(), PathBuf::from("deploy"));
        assert_eq!(config.resolved_data_dir(), PathBuf::from("deploy/.stack"));

        let bare = OrchestratorConfig::default();
        assert_eq!(bare.root_dir(), PathBuf::from("."));
    }
}
