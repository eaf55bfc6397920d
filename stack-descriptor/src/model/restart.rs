use serde::Serialize;

/// What happens when a started service exits.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// No relaunch. Also what an absent `restart` key means.
    #[default]
    Never,
    /// Relaunch unconditionally.
    Always,
    /// Relaunch on non-zero exit, optionally capped (`on-failure:5`).
    OnFailure { max_retries: Option<u32> },
}

impl RestartPolicy {
    /// Parses the descriptor spelling. `no` and `unless-stopped` are accepted aliases.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "no" | "never" => Some(Self::Never),
            "always" | "unless-stopped" => Some(Self::Always),
            "on-failure" => Some(Self::OnFailure { max_retries: None }),
            other => {
                let count = other.strip_prefix("on-failure:")?;
                let max = count.trim().parse().ok()?;
                Some(Self::OnFailure {
                    max_retries: Some(max),
                })
            }
        }
    }

    /// Decides whether to relaunch after an exit.
    ///
    /// `exit_code` is `None` when the process was killed by a signal, which
    /// counts as a failure. `restarts` is the number of relaunches so far.
    pub fn should_restart(&self, exit_code: Option<i32>, restarts: u32) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::OnFailure { max_retries } => {
                exit_code != Some(0) && max_retries.map_or(true, |max| restarts < max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(RestartPolicy::parse("no"), Some(RestartPolicy::Never));
        assert_eq!(
            RestartPolicy::parse("unless-stopped"),
            Some(RestartPolicy::Always)
        );
        assert_eq!(
            RestartPolicy::parse("on-failure:3"),
            Some(RestartPolicy::OnFailure {
                max_retries: Some(3)
            })
        );
        assert_eq!(RestartPolicy::parse("sometimes"), None);
        assert_eq!(RestartPolicy::parse("on-failure:x"), None);
    }

    #[test]
    fn restart_decisions() {
        assert!(!RestartPolicy::Never.should_restart(Some(1), 0));
        assert!(RestartPolicy::Always.should_restart(Some(0), 10));

        let on_failure = RestartPolicy::OnFailure {
            max_retries: Some(2),
        };
        assert!(!on_failure.should_restart(Some(0), 0));
        assert!(on_failure.should_restart(Some(1), 1));
        assert!(on_failure.should_restart(None, 0));
        assert!(!on_failure.should_restart(Some(1), 2));
    }
}
