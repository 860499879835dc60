use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{Outcome, Payload, Target};
use ssh::{SshConfig, SshSession};
use tracing::{debug, info, instrument};

use crate::fanout::run_all;
use crate::RemoteExecutor;

/// Default limit on dialing plus authenticating one target.
pub const CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Dials and authenticates a target without running anything.
///
/// Success carries `connected in <ms>ms` as output; failure carries the
/// elapsed time as output and the transport or credential error.
#[derive(Debug, Clone)]
pub struct ConnectionCheck {
    config: SshConfig,
    timeout: Duration,
}

impl ConnectionCheck {
    pub fn new(config: SshConfig) -> Self {
        Self::with_timeout(config, CHECK_TIMEOUT)
    }

    pub fn with_timeout(mut config: SshConfig, timeout: Duration) -> Self {
        config.connect_timeout = config.connect_timeout.min(timeout);
        config.auth_timeout = config.auth_timeout.min(timeout);
        Self { config, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn check(&self, target: &Target) -> Outcome {
        let started = Instant::now();
        let result =
            tokio::time::timeout(self.timeout, SshSession::connect(target, &self.config)).await;
        let latency = started.elapsed().as_millis();

        let outcome = match result {
            Ok(Ok(session)) => {
                session.close().await;
                Outcome::success(target.id(), format!("connected in {latency}ms"))
            }
            Ok(Err(e)) => {
                Outcome::failed(target.id(), format!("gave up after {latency}ms"), e.to_string())
            }
            Err(_) => Outcome::failed(
                target.id(),
                format!("gave up after {latency}ms"),
                format!("no answer within {}s", self.timeout.as_secs()),
            ),
        };
        debug!(
            host = %target.endpoint(),
            status = %outcome.status(),
            latency_ms = latency as u64,
            "connectivity checked"
        );
        outcome
    }
}

#[async_trait]
impl RemoteExecutor for ConnectionCheck {
    /// The payload is ignored.
    async fn execute(&self, target: &Target, _payload: &Payload) -> Outcome {
        self.check(target).await
    }
}

/// Check every target concurrently. Nothing is recorded in the ledger.
#[instrument(skip_all, fields(targets = targets.len()))]
pub async fn check_all<E>(checker: Arc<E>, targets: &[Target]) -> Vec<Outcome>
where
    E: RemoteExecutor + ?Sized + 'static,
{
    let outcomes = run_all(checker, targets, &Payload::command(""), |_| {}).await;
    let reachable = outcomes.iter().filter(|o| o.is_success()).count();
    info!(reachable, unreachable = outcomes.len() - reachable, "connectivity check complete");
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_caps_the_ssh_limits() {
        let check = ConnectionCheck::new(SshConfig::default());
        assert_eq!(check.timeout(), CHECK_TIMEOUT);
        assert_eq!(check.config.connect_timeout, CHECK_TIMEOUT);
        assert_eq!(check.config.auth_timeout, CHECK_TIMEOUT);

        let tight = SshConfig {
            connect_timeout: Duration::from_secs(1),
            ..Default::default()
        };
        let check = ConnectionCheck::new(tight);
        assert_eq!(check.config.connect_timeout, Duration::from_secs(1));
    }

    #[tokio::test]
    #[ntest::timeout(10000)]
    async fn refused_targets_are_reported_per_host() {
        let targets = vec![
            Target::new("127.0.0.1", 1, "root", "pw").unwrap(),
            Target::new("127.0.0.1", 9, "root", "pw").unwrap(),
        ];
        let check = Arc::new(ConnectionCheck::new(SshConfig::default()));
        let outcomes = check_all(check, &targets).await;

        assert_eq!(outcomes.len(), 2);
        let mut hosts: Vec<_> = outcomes.iter().map(|o| o.target().to_string()).collect();
        hosts.sort();
        assert_eq!(hosts, vec!["127.0.0.1:1", "127.0.0.1:9"]);
        for outcome in &outcomes {
            assert!(!outcome.is_success());
            assert!(!outcome.error().is_empty());
            assert!(outcome.output().starts_with("gave up after "), "{}", outcome.output());
        }
    }

    #[tokio::test]
    async fn empty_target_list_checks_nothing() {
        let check = Arc::new(ConnectionCheck::new(SshConfig::default()));
        assert!(check_all(check, &[]).await.is_empty());
    }
}
