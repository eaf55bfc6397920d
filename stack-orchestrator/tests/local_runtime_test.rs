//! Runs real host processes through the local runtime. Needs `sh`, `sleep` and `test`.

use stack_descriptor::{parse_str, HealthCheckSpec};
use stack_orchestrator::event_bus::{EventBus, SystemEvent};
use stack_orchestrator::plan::{PlanEngine, ServiceConfig};
use stack_orchestrator::runtime::{LocalServiceProvider, ServiceProcess, ServiceProvider};
use stack_orchestrator::supervisor::{EndReason, ServiceState, Supervisor, SupervisorOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".into(), "-c".into(), script.into()]
}

fn service(dir: &Path, script: &str) -> ServiceConfig {
    ServiceConfig::new("svc", dir.to_path_buf()).with_command(sh(script))
}

#[tokio::test]
async fn test_exit_code_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = LocalServiceProvider::new(dir.path());

    let mut process = runtime.spawn(&service(dir.path(), "exit 3")).await.unwrap();
    assert!(process.pid().is_some());
    assert_eq!(process.wait().await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_environment_and_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = LocalServiceProvider::new(dir.path());

    let mut env = BTreeMap::new();
    env.insert(
        "DATABASE_URL".to_string(),
        "postgresql+asyncpg://user:password@db:5432/dbname".to_string(),
    );
    let config = service(dir.path(), "printf '%s' \"$DATABASE_URL\" > seen.txt").with_env(env);

    let mut process = runtime.spawn(&config).await.unwrap();
    assert_eq!(process.wait().await.unwrap(), Some(0));

    let seen = std::fs::read_to_string(dir.path().join("seen.txt")).unwrap();
    assert_eq!(seen, "postgresql+asyncpg://user:password@db:5432/dbname");
}

#[tokio::test]
async fn test_stop_terminates_process_group() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = LocalServiceProvider::new(dir.path());

    let mut process = runtime
        .spawn(&service(dir.path(), "sleep 30; echo done"))
        .await
        .unwrap();

    let start = Instant::now();
    process.stop(Duration::from_secs(5)).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stop_kills_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = LocalServiceProvider::new(dir.path());

    // The ignored SIGTERM disposition is inherited by `sleep`.
    let mut process = runtime
        .spawn(&service(dir.path(), "trap '' TERM; sleep 30"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = Instant::now();
    let code = process.stop(Duration::from_millis(300)).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(code, None);
}

#[tokio::test]
async fn test_probe_reflects_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = LocalServiceProvider::new(dir.path());
    let config = service(dir.path(), "true");
    let check = HealthCheckSpec::new(
        vec!["test".into(), "-f".into(), "ready".into()],
        Duration::from_secs(1),
        Duration::from_secs(1),
        3,
    );

    assert!(!runtime.probe(&config, &check).await.unwrap());
    std::fs::write(dir.path().join("ready"), "").unwrap();
    assert!(runtime.probe(&config, &check).await.unwrap());

    let missing = HealthCheckSpec::new(
        vec!["/nonexistent/probe-binary".into()],
        Duration::from_secs(1),
        Duration::from_secs(1),
        3,
    );
    assert!(runtime.probe(&config, &missing).await.is_err());
}

#[tokio::test]
async fn test_named_volumes_live_under_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let text = "name: shop\nservices:\n  db:\n    command: [\"true\"]\n    volumes: [\"pgdata:/data\"]\nvolumes:\n  pgdata:\n";
    let descriptor = parse_str(text, "shop", &|_: &str| None).unwrap();
    let plan = PlanEngine::resolve(&descriptor, dir.path(), None).unwrap();
    let runtime = LocalServiceProvider::new(dir.path().join(".stack"));

    runtime.prepare(&plan).await.unwrap();
    let volume = runtime.volume_dir(&plan.volumes()[0]);
    assert_eq!(volume, dir.path().join(".stack/volumes/shop_pgdata"));
    assert!(volume.is_dir());

    runtime.teardown(&plan, false).await.unwrap();
    assert!(volume.is_dir());
    runtime.teardown(&plan, true).await.unwrap();
    assert!(!volume.exists());
}

#[tokio::test]
async fn test_mounted_volume_reaches_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let text = "name: shop\nservices:\n  db:\n    command: sh -c 'touch \"$$STACK_VOLUME_PGDATA/marker\"'\n    volumes: [\"pgdata:/var/lib/postgresql/data\"]\nvolumes:\n  pgdata:\n";
    let descriptor = parse_str(text, "shop", &|_: &str| None).unwrap();
    let plan = PlanEngine::resolve(&descriptor, dir.path(), None).unwrap();
    let runtime = LocalServiceProvider::new(dir.path().join(".stack"));
    runtime.prepare(&plan).await.unwrap();

    let db = plan.service("db").unwrap();
    let volume = runtime.volume_dir(&plan.volumes()[0]);
    assert_eq!(
        runtime.volume_env(db).get("STACK_VOLUME_PGDATA"),
        Some(&volume.display().to_string())
    );

    let mut process = runtime.spawn(db).await.unwrap();
    assert_eq!(process.wait().await.unwrap(), Some(0));
    assert!(volume.join("marker").is_file());
}

/// Verification Test: Health-gated stack on the host
///
/// **Objective**: A dependent gated on `service_healthy` launches only after
/// the dependency's probe sees the ready file, and shutdown leaves nothing
/// running.
#[tokio::test]
async fn test_gated_stack_end_to_end() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let text = r#"
name: e2e
services:
  store:
    command: sh -c 'sleep 0.5; touch ready; exec sleep 30'
    healthcheck:
      test: ["CMD", "test", "-f", "ready"]
      interval: 200ms
      timeout: 1s
      retries: 20
  app:
    command: sh -c 'test -f ready && exec sleep 30'
    depends_on:
      store:
        condition: service_healthy
"#;
    let descriptor = parse_str(text, "e2e", &|_: &str| None).unwrap();
    let plan = PlanEngine::resolve(&descriptor, dir.path(), None).unwrap();
    let runtime = Arc::new(LocalServiceProvider::new(dir.path().join(".stack")));
    let bus = EventBus::new();
    let mut events = bus.subscribe();
    let options = SupervisorOptions {
        stop_grace: Duration::from_secs(2),
        ..Default::default()
    };

    let (cancel, cancel_rx) = watch::channel(false);
    let run = tokio::spawn(Supervisor::new(plan, runtime, bus, options).run(cancel_rx));

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Ok(SystemEvent::ServiceStarted { service, .. }) = events.recv().await {
                if service == "app" {
                    break;
                }
            }
        }
    })
    .await
    .expect("app never started");

    cancel.send(true).unwrap();
    let report = run.await.unwrap().unwrap();

    assert_eq!(report.reason, EndReason::Cancelled);
    assert_eq!(report.start_order, vec!["store", "app"]);
    assert!(!report.has_failures(), "{}", report);
    assert_eq!(report.services["store"].state, ServiceState::Stopped);
    assert_eq!(report.services["app"].state, ServiceState::Stopped);
}
