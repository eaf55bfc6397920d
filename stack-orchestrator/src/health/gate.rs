use crate::event_bus::{EventBus, SystemEvent};
use crate::health::HealthState;
use anyhow::Result;
use log::{debug, info, warn};
use humantime::format_duration;
use stack_descriptor::HealthCheckSpec;
use std::future::Future;
use tokio::time::{sleep, timeout, Instant};

/// Verdict of one gate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub health: HealthState,
    /// Attempts made, including the successful one.
    pub attempts: u32,
}

/// Runs a service's probe until it succeeds or the attempt budget is spent.
///
/// The first attempt runs immediately. Between attempts the gate sleeps for
/// `interval`; it never sleeps after the last one. Each attempt is bounded by
/// `timeout`, and the attempt future is dropped when the bound is hit, which
/// kills a probe process spawned with `kill_on_drop`.
pub struct ReadinessGate {
    service: String,
    check: HealthCheckSpec,
    event_bus: EventBus,
}

impl ReadinessGate {
    pub fn new(service: impl Into<String>, check: HealthCheckSpec, event_bus: EventBus) -> Self {
        Self {
            service: service.into(),
            check,
            event_bus,
        }
    }

    /// Drives `probe` to a verdict.
    ///
    /// `probe` returns `Ok(true)` on a zero exit status, `Ok(false)` on any
    /// other, and `Err` when the probe could not be launched. Errors count as
    /// failed attempts.
    pub async fn wait<F, Fut>(&self, mut probe: F) -> GateOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let retries = self.check.retries().max(1);
        let started = Instant::now();

        for attempt in 1..=retries {
            let success = match timeout(self.check.timeout(), probe()).await {
                Ok(Ok(passed)) => passed,
                Ok(Err(e)) => {
                    warn!(
                        "Gate: Probe for '{}' could not be launched (attempt {}/{}): {:#}",
                        self.service, attempt, retries, e
                    );
                    false
                }
                Err(_) => {
                    warn!(
                        "Gate: Probe for '{}' timed out after {} (attempt {}/{})",
                        self.service,
                        format_duration(self.check.timeout()),
                        attempt,
                        retries
                    );
                    false
                }
            };

            self.event_bus.publish(SystemEvent::ProbeAttempt {
                service: self.service.clone(),
                attempt,
                retries,
                success,
            });

            if success {
                info!(
                    "Gate: '{}' is healthy after {} attempt(s) ({:?})",
                    self.service,
                    attempt,
                    started.elapsed()
                );
                return self.finish(HealthState::Healthy, attempt);
            }

            debug!(
                "Gate: '{}' not ready (attempt {}/{})",
                self.service, attempt, retries
            );
            if attempt < retries {
                sleep(self.check.interval()).await;
            }
        }

        warn!(
            "Gate: '{}' is unhealthy, probe failed {} time(s)",
            self.service, retries
        );
        self.finish(HealthState::Unhealthy, retries)
    }

    fn finish(&self, health: HealthState, attempts: u32) -> GateOutcome {
        self.event_bus.publish(SystemEvent::HealthChanged {
            service: self.service.clone(),
            health,
        });
        GateOutcome { health, attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn check(retries: u32) -> HealthCheckSpec {
        HealthCheckSpec::new(
            vec!["pg_isready".into()],
            Duration::from_secs(5),
            Duration::from_secs(2),
            retries,
        )
    }

    /// Counts calls and succeeds from call number `succeed_on` onwards (0 = never).
    fn scripted(succeed_on: u32) -> (Arc<AtomicU32>, impl FnMut() -> futures::future::Ready<Result<bool>>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let probe = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            futures::future::ready(Ok(succeed_on != 0 && n >= succeed_on))
        };
        (calls, probe)
    }

    /// Verification Test: Probe fails four times, then succeeds
    ///
    /// **Objective**
    /// The gate turns healthy on the fifth attempt, having slept exactly four
    /// intervals and no more.
    #[tokio::test(start_paused = true)]
    async fn test_healthy_on_fifth_attempt() {
        let _ = env_logger::builder().is_test(true).try_init();
        let gate = ReadinessGate::new("db", check(5), EventBus::new());
        let (calls, probe) = scripted(5);

        let start = Instant::now();
        let outcome = gate.wait(probe).await;

        assert_eq!(outcome.health, HealthState::Healthy);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    /// Verification Test: Retry budget exhausted
    ///
    /// **Objective**
    /// Five failures give `Unhealthy`, with no sleep after the last attempt.
    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_after_budget() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let gate = ReadinessGate::new("db", check(5), bus);
        let (calls, probe) = scripted(0);

        let start = Instant::now();
        let outcome = gate.wait(probe).await;

        assert_eq!(outcome.health, HealthState::Unhealthy);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(20));

        let mut attempts = 0;
        let mut verdict = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                SystemEvent::ProbeAttempt { success, .. } => {
                    assert!(!success);
                    attempts += 1;
                }
                SystemEvent::HealthChanged { health, .. } => verdict = Some(health),
                _ => {}
            }
        }
        assert_eq!(attempts, 5);
        assert_eq!(verdict, Some(HealthState::Unhealthy));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_is_immediate() {
        let gate = ReadinessGate::new("db", check(3), EventBus::new());
        let (_, probe) = scripted(1);
        let start = Instant::now();
        let outcome = gate.wait(probe).await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    /// Verification Test: Hung probe
    ///
    /// **Objective**
    /// An attempt that outlives `timeout` is abandoned and counted as a failure.
    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let gate = ReadinessGate::new("db", check(2), EventBus::new());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let start = Instant::now();
        let outcome = gate
            .wait(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        std::future::pending::<()>().await;
                    }
                    Ok(true)
                }
            })
            .await;

        assert_eq!(outcome.health, HealthState::Healthy);
        assert_eq!(outcome.attempts, 2);
        // 2s timeout on the first attempt, then one 5s interval.
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_error_counts_as_failure() {
        let gate = ReadinessGate::new("db", check(2), EventBus::new());
        let outcome = gate
            .wait(|| async { Err(anyhow::anyhow!("no such binary")) })
            .await;
        assert_eq!(outcome.health, HealthState::Unhealthy);
        assert_eq!(outcome.attempts, 2);
    }
}
