mod args;

use anyhow::{Context, Result};
use args::{Cli, Commands};
use clap::Parser;
use log::{error, info, warn};
use stack_descriptor::{check_endpoints, Descriptor};
use stack_orchestrator::api;
use stack_orchestrator::config::{OrchestratorConfig, RuntimeKind};
use stack_orchestrator::event_bus::EventBus;
use stack_orchestrator::plan::{LaunchPlan, PlanEngine};
use stack_orchestrator::runtime::{DockerServiceProvider, LocalServiceProvider, ServiceProvider};
use stack_orchestrator::state;
use stack_orchestrator::supervisor::{Supervisor, SupervisorOptions};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.to_config();

    match cli.command {
        Commands::Up => {
            if !up(&config).await? {
                std::process::exit(1);
            }
        }
        Commands::Config => show_config(&config)?,
        Commands::Plan => show_plan(&config)?,
        Commands::Down { volumes } => down(&config, volumes).await?,
    }
    Ok(())
}

fn load_plan(config: &OrchestratorConfig) -> Result<(Descriptor, LaunchPlan)> {
    let descriptor = stack_descriptor::load(&config.descriptor_path)?;
    let root_dir = std::fs::canonicalize(config.root_dir()).with_context(|| {
        format!(
            "Failed to resolve directory of {}",
            config.descriptor_path.display()
        )
    })?;
    let plan = PlanEngine::resolve(&descriptor, &root_dir, config.project_name.as_deref())?;
    Ok((descriptor, plan))
}

/// Returns whether the run ended without failures.
async fn up(config: &OrchestratorConfig) -> Result<bool> {
    let (descriptor, plan) = load_plan(config)?;
    for warning in check_endpoints(&descriptor) {
        warn!("Descriptor: {}", warning);
    }
    PlanEngine::check_runtime(&plan, config.runtime)?;

    match config.runtime {
        RuntimeKind::Local => {
            let runtime = LocalServiceProvider::new(config.resolved_data_dir());
            run_up(config, plan, runtime).await
        }
        RuntimeKind::Docker => run_up(config, plan, DockerServiceProvider::new()).await,
    }
}

async fn run_up<P: ServiceProvider + 'static>(
    config: &OrchestratorConfig,
    plan: LaunchPlan,
    runtime: P,
) -> Result<bool> {
    let event_bus = EventBus::new();
    let status = state::create_state(&plan);
    let tracker = state::track(status.clone(), &event_bus);

    let api_task = config.status_port.map(|port| {
        let status = status.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, status).await {
                error!("API: {:#}", e);
            }
        })
    });

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, stopping the stack");
                cancel_tx.send_replace(true);
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let supervisor = Supervisor::new(
        plan,
        Arc::new(runtime),
        event_bus,
        SupervisorOptions::from(config),
    );
    let report = supervisor.run(cancel_rx).await?;

    tracker.abort();
    if let Some(task) = api_task {
        task.abort();
    }

    print!("{}", report);
    Ok(!report.has_failures())
}

fn show_config(config: &OrchestratorConfig) -> Result<()> {
    let (descriptor, _) = load_plan(config)?;
    let json = serde_json::to_string_pretty(&descriptor).context("Failed to render descriptor")?;
    println!("{}", json);
    for warning in check_endpoints(&descriptor) {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

fn show_plan(config: &OrchestratorConfig) -> Result<()> {
    let (_, plan) = load_plan(config)?;
    println!("Project: {} (network {})", plan.project(), plan.network());
    for (i, layer) in plan.layers().iter().enumerate() {
        println!("  layer {}: {}", i, layer.join(", "));
    }
    println!("Start order: {}", plan.order().join(" -> "));
    Ok(())
}

async fn down(config: &OrchestratorConfig, remove_volumes: bool) -> Result<()> {
    let (_, plan) = load_plan(config)?;
    let runtime: Box<dyn ServiceProvider> = match config.runtime {
        RuntimeKind::Local => Box::new(LocalServiceProvider::new(config.resolved_data_dir())),
        RuntimeKind::Docker => Box::new(DockerServiceProvider::new()),
    };
    runtime
        .teardown(&plan, remove_volumes)
        .await
        .with_context(|| format!("Failed to take down '{}'", plan.project()))?;
    info!(
        "Removed resources of '{}'{}",
        plan.project(),
        if remove_volumes { " and its volumes" } else { "" }
    );
    Ok(())
}
