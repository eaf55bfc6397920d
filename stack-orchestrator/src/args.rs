use clap::{Parser, Subcommand};
use stack_orchestrator::config::{OrchestratorConfig, RuntimeKind};
use std::path::PathBuf;
use std::time::Duration;

/// Health-gated orchestrator for compose-style service stacks.
#[derive(Parser, Debug)]
#[command(name = "stack-orchestrator")]
#[command(about = "Start services in dependency order, gated on readiness probes", long_about = None)]
pub struct Cli {
    /// Descriptor file.
    #[arg(short = 'f', long = "file", default_value = "compose.yaml", global = true)]
    pub file: PathBuf,

    /// Project name (defaults to the descriptor's `name`, then its directory name).
    #[arg(short = 'p', long = "project-name", global = true)]
    pub project_name: Option<String>,

    /// Where services run.
    #[arg(long, value_enum, default_value = "docker", global = true)]
    pub runtime: RuntimeKind,

    /// Data directory of the local runtime (default: `.stack` next to the descriptor).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Serve the status API on this port.
    #[arg(long, global = true)]
    pub status_port: Option<u16>,

    /// Delay before relaunching a service, e.g. `1s` or `500ms`.
    #[arg(long, value_parser = parse_duration_arg, default_value = "1s", global = true)]
    pub restart_delay: Duration,

    /// Time between SIGTERM and kill when stopping a service.
    #[arg(long, value_parser = parse_duration_arg, default_value = "10s", global = true)]
    pub stop_grace: Duration,

    /// Keep running when a service fails to start or turns unhealthy.
    #[arg(long, global = true)]
    pub no_abort_on_failure: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate, plan, launch and supervise the stack until Ctrl-C or failure.
    Up,
    /// Validate and print the resolved descriptor as JSON.
    Config,
    /// Print the start layers and start order.
    Plan,
    /// Remove the stack's runtime resources.
    Down {
        /// Also remove named volumes.
        #[arg(short, long)]
        volumes: bool,
    },
}

impl Cli {
    pub fn to_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            descriptor_path: self.file.clone(),
            project_name: self.project_name.clone(),
            runtime: self.runtime,
            data_dir: self.data_dir.clone(),
            status_port: self.status_port,
            restart_delay: self.restart_delay,
            stop_grace: self.stop_grace,
            abort_on_failure: !self.no_abort_on_failure,
        }
    }
}

fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| format!("invalid duration '{}': {}", value, e))
}
