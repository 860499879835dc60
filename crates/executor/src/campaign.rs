use std::sync::Arc;

use common::{Outcome, Owner, Payload, Target};
use ledger::{Ledger, Session, SessionMode};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::canary::run_canary;
use crate::error::{ExecutorError, Result};
use crate::fanout::run_all;
use crate::playbook::PlaybookRunner;
use crate::RemoteExecutor;

/// A finished run and the session its rows were recorded under.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session: Session,
    pub outcomes: Vec<Outcome>,
}

/// The canary half of a rollout.
#[derive(Debug, Clone, Serialize)]
pub struct CanaryReport {
    pub session: Session,
    /// Id of the target the canary ran on.
    pub chosen: String,
    pub outcome: Outcome,
    /// Target ids still waiting for `continue_rollout`.
    pub remaining: Vec<String>,
}

/// Runs payloads and records every outcome in the ledger.
#[derive(Clone)]
pub struct Campaign {
    executor: Arc<dyn RemoteExecutor>,
    playbooks: PlaybookRunner,
    ledger: Ledger,
}

impl Campaign {
    pub fn new(executor: Arc<dyn RemoteExecutor>, playbooks: PlaybookRunner, ledger: Ledger) -> Self {
        Self {
            executor,
            playbooks,
            ledger,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run `payload` on every target under a fresh session.
    #[instrument(skip_all, fields(owner = %owner.name, targets = targets.len()))]
    pub async fn run(&self, owner: &Owner, targets: &[Target], payload: &Payload) -> Result<RunReport> {
        if targets.is_empty() {
            return Err(ExecutorError::NoTargets);
        }
        let session = self.ledger.create_session(owner, SessionMode::Standard)?;
        info!(session = %session.name, "run started");
        let outcomes = self.dispatch(&session, targets, payload).await?;
        Ok(RunReport { session, outcomes })
    }

    /// Run `payload` on one random target under a fresh canary session.
    #[instrument(skip_all, fields(owner = %owner.name, targets = targets.len()))]
    pub async fn start_canary(
        &self,
        owner: &Owner,
        targets: &[Target],
        payload: &Payload,
    ) -> Result<CanaryReport> {
        if targets.len() < 2 {
            return Err(ExecutorError::CanaryNotApplicable {
                available: targets.len(),
            });
        }
        let session = self.ledger.create_session(owner, SessionMode::Canary)?;
        let run = run_canary(self.executor.as_ref(), targets, payload).await?;
        let outcome = self
            .record(&session, vec![run.outcome])
            .await?
            .remove(0);

        info!(
            session = %session.name,
            canary = %run.chosen.id(),
            status = %outcome.status(),
            "canary finished"
        );
        Ok(CanaryReport {
            session,
            chosen: run.chosen.id(),
            outcome,
            remaining: run.remaining.iter().map(Target::id).collect(),
        })
    }

    /// Finish a rollout on `remaining`, appending to the existing session.
    #[instrument(skip_all, fields(owner = %owner.name, session = session_name))]
    pub async fn continue_rollout(
        &self,
        owner: &Owner,
        session_name: &str,
        remaining: &[Target],
        payload: &Payload,
    ) -> Result<RunReport> {
        let session = self.ledger.find_session(owner, session_name)?;
        if remaining.is_empty() {
            return Err(ExecutorError::NoTargets);
        }
        let outcomes = self.dispatch(&session, remaining, payload).await?;
        Ok(RunReport { session, outcomes })
    }

    /// Execute and record. Commands fan out per target and each row is
    /// appended as its outcome arrives; a playbook runs once and its
    /// aggregate outcome is recorded against every target.
    async fn dispatch(
        &self,
        session: &Session,
        targets: &[Target],
        payload: &Payload,
    ) -> Result<Vec<Outcome>> {
        match payload {
            Payload::Command(_) => {
                let recorder = Recorder::spawn(self.ledger.clone(), session.clone());
                let outcomes =
                    run_all(Arc::clone(&self.executor), targets, payload, |outcome| {
                        recorder.push(outcome)
                    })
                    .await;
                recorder.finish(outcomes).await
            }
            Payload::Playbook(playbook) => {
                let aggregate = self.playbooks.run(targets, playbook).await;
                let outcomes = targets.iter().map(|t| aggregate.retarget(t.id())).collect();
                self.record(session, outcomes).await
            }
        }
    }

    async fn record(&self, session: &Session, outcomes: Vec<Outcome>) -> Result<Vec<Outcome>> {
        let recorder = Recorder::spawn(self.ledger.clone(), session.clone());
        for outcome in &outcomes {
            recorder.push(outcome);
        }
        recorder.finish(outcomes).await
    }
}

/// Appends log rows on a blocking thread, in the order outcomes are pushed.
///
/// After the first failed write the remaining rows are dropped; the error is
/// returned from [`Recorder::finish`] together with every outcome.
struct Recorder {
    tx: mpsc::UnboundedSender<Outcome>,
    writer: JoinHandle<ledger::Result<usize>>,
}

impl Recorder {
    fn spawn(ledger: Ledger, session: Session) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
        let writer = tokio::task::spawn_blocking(move || {
            let mut written = 0;
            let mut failure = None;
            while let Some(outcome) = rx.blocking_recv() {
                if failure.is_some() {
                    continue;
                }
                match ledger.record_outcome(&session, &outcome) {
                    Ok(_) => written += 1,
                    Err(e) => {
                        warn!(session = %session.name, host = %outcome.target(), %e, "failed to record outcome");
                        failure = Some(e);
                    }
                }
            }
            match failure {
                Some(e) => Err(e),
                None => Ok(written),
            }
        });
        Self { tx, writer }
    }

    fn push(&self, outcome: &Outcome) {
        // The writer drains until every sender is gone.
        let _ = self.tx.send(outcome.clone());
    }

    async fn finish(self, outcomes: Vec<Outcome>) -> Result<Vec<Outcome>> {
        let Self { tx, writer } = self;
        drop(tx);
        let source = match writer.await {
            Ok(Ok(_)) => return Ok(outcomes),
            Ok(Err(e)) => ExecutorError::Ledger(e),
            Err(e) => ExecutorError::Writer(e),
        };
        Err(ExecutorError::Unrecorded {
            outcomes,
            source: Box::new(source),
        })
    }
}
