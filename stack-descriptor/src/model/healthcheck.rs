use crate::duration::{self, parse_duration};
use crate::error::{DescriptorError, Result};
use crate::raw::{RawHealthCheck, StringOrList};
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRIES: u32 = 3;

/// A readiness probe: the command to run and its cadence.
///
/// `retries` is the total number of attempts before the target is declared
/// unhealthy. Each attempt must finish within `timeout`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckSpec {
    test: Vec<String>,
    #[serde(serialize_with = "duration::serialize")]
    interval: Duration,
    #[serde(serialize_with = "duration::serialize")]
    timeout: Duration,
    retries: u32,
}

impl HealthCheckSpec {
    pub fn new(test: Vec<String>, interval: Duration, timeout: Duration, retries: u32) -> Self {
        Self {
            test,
            interval,
            timeout,
            retries,
        }
    }

    /// The probe argument vector. Shell-form probes are already wrapped in `sh -c`.
    pub fn test(&self) -> &[String] {
        &self.test
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Returns `None` for disabled probes (`disable: true` or `test: ["NONE"]`).
    pub(crate) fn from_raw(service: &str, raw: RawHealthCheck) -> Result<Option<Self>> {
        if raw.disable.unwrap_or(false) {
            return Ok(None);
        }

        let invalid = |reason: &str| DescriptorError::InvalidHealthCheck {
            service: service.to_string(),
            reason: reason.to_string(),
        };

        let test = match raw.test {
            Some(test) => match probe_command(test).map_err(|r| invalid(&r))? {
                Some(argv) => argv,
                None => return Ok(None),
            },
            None => return Err(invalid("missing 'test'")),
        };

        let interval = parse_field(service, "interval", raw.interval, DEFAULT_INTERVAL)?;
        let timeout = parse_field(service, "timeout", raw.timeout, DEFAULT_TIMEOUT)?;

        let retries = match raw.retries {
            Some(value) => value
                .to_text()
                .trim()
                .parse::<u32>()
                .map_err(|_| invalid("'retries' must be a positive integer"))?,
            None => DEFAULT_RETRIES,
        };
        if retries == 0 {
            return Err(invalid("'retries' must be at least 1"));
        }
        if timeout.is_zero() {
            return Err(invalid("'timeout' must be greater than zero"));
        }

        Ok(Some(Self::new(test, interval, timeout, retries)))
    }
}

/// Turns a `test` entry into an argument vector.
///
/// `["CMD", args...]` runs as-is, `["CMD-SHELL", cmd]` and plain strings run
/// through `sh -c`, `["NONE"]` disables the probe.
fn probe_command(test: StringOrList) -> std::result::Result<Option<Vec<String>>, String> {
    match test {
        StringOrList::String(cmd) => {
            if cmd.trim().is_empty() {
                return Err("empty 'test'".to_string());
            }
            Ok(Some(shell(cmd)))
        }
        StringOrList::List(items) => {
            let (kind, rest) = items
                .split_first()
                .ok_or_else(|| "empty 'test'".to_string())?;
            match kind.as_str() {
                "NONE" => Ok(None),
                "CMD" if !rest.is_empty() => Ok(Some(rest.to_vec())),
                "CMD-SHELL" if !rest.is_empty() => Ok(Some(shell(rest.join(" ")))),
                "CMD" | "CMD-SHELL" => Err(format!("'{}' needs a command", kind)),
                other => Err(format!(
                    "'test' must start with CMD, CMD-SHELL or NONE, found '{}'",
                    other
                )),
            }
        }
    }
}

fn shell(cmd: String) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), cmd]
}

fn parse_field(
    service: &str,
    field: &str,
    value: Option<String>,
    default: Duration,
) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(text) => parse_duration(&text).ok_or_else(|| DescriptorError::InvalidDuration {
            service: service.to_string(),
            field: field.to_string(),
            value: text,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::StringOrNumber;

    fn raw(test: StringOrList) -> RawHealthCheck {
        RawHealthCheck {
            test: Some(test),
            ..Default::default()
        }
    }

    #[test]
    fn shell_form_is_wrapped() {
        let spec = HealthCheckSpec::from_raw(
            "db",
            raw(StringOrList::List(vec![
                "CMD-SHELL".into(),
                "pg_isready -U user".into(),
            ])),
        )
        .unwrap()
        .unwrap();
        assert_eq!(spec.test(), &["sh", "-c", "pg_isready -U user"]);
        assert_eq!(spec.interval(), DEFAULT_INTERVAL);
        assert_eq!(spec.retries(), DEFAULT_RETRIES);
    }

    #[test]
    fn exec_form_and_cadence() {
        let mut check = raw(StringOrList::List(vec![
            "CMD".into(),
            "pg_isready".into(),
            "-q".into(),
        ]));
        check.interval = Some("5s".into());
        check.timeout = Some("2s".into());
        check.retries = Some(StringOrNumber::Number(5));

        let spec = HealthCheckSpec::from_raw("db", check).unwrap().unwrap();
        assert_eq!(spec.test(), &["pg_isready", "-q"]);
        assert_eq!(spec.interval(), Duration::from_secs(5));
        assert_eq!(spec.timeout(), Duration::from_secs(2));
        assert_eq!(spec.retries(), 5);
    }

    #[test]
    fn disabled_probes() {
        let none = raw(StringOrList::List(vec!["NONE".into()]));
        assert!(HealthCheckSpec::from_raw("db", none).unwrap().is_none());

        let mut disabled = raw(StringOrList::String("true".into()));
        disabled.disable = Some(true);
        assert!(HealthCheckSpec::from_raw("db", disabled).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_probes() {
        let bare = raw(StringOrList::List(vec!["pg_isready".into()]));
        assert!(HealthCheckSpec::from_raw("db", bare).is_err());

        let mut zero = raw(StringOrList::String("true".into()));
        zero.retries = Some(StringOrNumber::Number(0));
        assert!(HealthCheckSpec::from_raw("db", zero).is_err());

        let mut bad_interval = raw(StringOrList::String("true".into()));
        bad_interval.interval = Some("soon".into());
        assert!(matches!(
            HealthCheckSpec::from_raw("db", bad_interval),
            Err(DescriptorError::InvalidDuration { .. })
        ));
    }
}
