//! Drives the docker runtime against a scripted stand-in for the `docker` CLI.
//! Needs `sh`, `sleep` and `grep`.

use stack_descriptor::parse_str;
use stack_orchestrator::event_bus::{EventBus, SystemEvent};
use stack_orchestrator::plan::{LaunchPlan, PlanEngine};
use stack_orchestrator::runtime::{DockerServiceProvider, ServiceProvider};
use stack_orchestrator::supervisor::{EndReason, ServiceState, Supervisor, SupervisorOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Records every call in `calls.log`. `create` takes a second, like a pull
/// would, and the container only exists afterwards. `exec` succeeds only
/// while the container is started.
const FAKE_DOCKER: &str = r#"#!/bin/sh
state='@STATE@'
echo "$*" >> "$state/calls.log"
case "$1" in
  image)
    grep -qxF "$3" "$state/pulled" 2>/dev/null
    ;;
  pull)
    echo "$2" >> "$state/pulled"
    ;;
  create)
    prev=""
    for arg in "$@"; do
      if [ "$prev" = "--name" ]; then name="$arg"; fi
      prev="$arg"
    done
    sleep 1
    touch "$state/$name.created"
    echo "$name"
    ;;
  start)
    [ -f "$state/$3.created" ] || exit 1
    touch "$state/$3.running"
    while [ -f "$state/$3.running" ]; do sleep 0.1; done
    ;;
  exec)
    [ -f "$state/$2.running" ]
    ;;
  stop)
    rm -f "$state/$4.running"
    ;;
  rm)
    rm -f "$state/$3.created" "$state/$3.running"
    ;;
esac
"#;

const STACK: &str = r#"
name: fake
services:
  db:
    image: postgres:16
    healthcheck:
      test: ["CMD", "pg_isready"]
      interval: 200ms
      timeout: 1s
      retries: 5
  api:
    image: shop-api
    depends_on:
      db:
        condition: service_healthy
"#;

fn fake_docker(dir: &Path) -> PathBuf {
    let path = dir.join("docker");
    std::fs::write(&path, FAKE_DOCKER.replace("@STATE@", &dir.display().to_string())).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn first_call(calls: &[String], prefix: &str) -> usize {
    calls
        .iter()
        .position(|c| c.starts_with(prefix))
        .unwrap_or_else(|| panic!("no '{}' call in {:?}", prefix, calls))
}

fn plan(dir: &Path) -> LaunchPlan {
    let descriptor = parse_str(STACK, "fake", &|_: &str| None).unwrap();
    PlanEngine::resolve(&descriptor, dir, None).unwrap()
}

#[tokio::test]
async fn test_prepare_pulls_missing_images_once() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = DockerServiceProvider::with_binary(fake_docker(dir.path()).display().to_string());
    let plan = plan(dir.path());

    runtime.prepare(&plan).await.unwrap();
    runtime.prepare(&plan).await.unwrap();

    let calls = calls(dir.path());
    let pulls: Vec<&String> = calls.iter().filter(|c| c.starts_with("pull ")).collect();
    assert_eq!(pulls, ["pull shop-api", "pull postgres:16"]);
    assert_eq!(
        calls.iter().filter(|c| c.starts_with("image inspect ")).count(),
        4
    );
}

/// Verification Test: Slow container creation
///
/// **Objective**: The gate only probes a container that exists. Creation
/// that outlasts every probe attempt must not turn the dependency unhealthy.
///
/// **Scenario**:
/// 1. `create` takes 1s; the probe budget is 5 attempts 200ms apart.
/// 2. **Assertion**: `db` is created before it is first probed, `api` starts,
///    and the run ends without failures.
#[tokio::test]
async fn test_gate_waits_for_container_creation() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let runtime = Arc::new(DockerServiceProvider::with_binary(
        fake_docker(dir.path()).display().to_string(),
    ));
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let options = SupervisorOptions {
        stop_grace: Duration::from_secs(2),
        ..Default::default()
    };

    let (cancel, cancel_rx) = watch::channel(false);
    let run = tokio::spawn(Supervisor::new(plan(dir.path()), runtime, bus, options).run(cancel_rx));

    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            if let Ok(SystemEvent::ServiceStarted { service, .. }) = events.recv().await {
                if service == "api" {
                    break;
                }
            }
        }
    })
    .await
    .expect("api never started");

    cancel.send(true).unwrap();
    let report = run.await.unwrap().unwrap();

    assert_eq!(report.reason, EndReason::Cancelled);
    assert!(!report.has_failures(), "{}", report);
    assert_eq!(report.start_order, vec!["db", "api"]);
    assert_eq!(report.services["db"].unhealthy_launches, 0);
    assert_eq!(report.services["db"].state, ServiceState::Stopped);

    let calls = calls(dir.path());
    let pull = first_call(&calls, "pull postgres:16");
    let create = first_call(&calls, "create --rm --name fake-db-1");
    let start = first_call(&calls, "start -a fake-db-1");
    let exec = first_call(&calls, "exec fake-db-1 pg_isready");
    assert!(pull < create, "{:?}", calls);
    assert!(create < start, "{:?}", calls);
    assert!(create < exec, "{:?}", calls);
    assert!(first_call(&calls, "create --rm --name fake-api-1") > exec);
    assert!(calls.iter().any(|c| c.starts_with("stop -t 2 fake-db-1")));
}
