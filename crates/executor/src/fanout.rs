use std::sync::Arc;

use common::{Outcome, Payload, Target};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::RemoteExecutor;

/// Error text for a target whose task died before reporting.
pub const ABORTED_TASK_ERROR: &str = "execution task aborted";

/// Run `payload` on every target concurrently and wait for all of them.
///
/// One task per target; no target's failure affects another. `observe` sees
/// each outcome as it arrives, and the returned vector is in the same
/// completion order. Exactly one outcome per target is returned, including
/// for duplicated targets and for tasks that panicked.
#[instrument(skip_all, fields(targets = targets.len()))]
pub async fn run_all<E, F>(
    executor: Arc<E>,
    targets: &[Target],
    payload: &Payload,
    mut observe: F,
) -> Vec<Outcome>
where
    E: RemoteExecutor + ?Sized + 'static,
    F: FnMut(&Outcome),
{
    if targets.is_empty() {
        return Vec::new();
    }

    let payload = Arc::new(payload.clone());
    let (tx, mut rx) = mpsc::channel::<(usize, Outcome)>(targets.len());

    let mut handles = Vec::with_capacity(targets.len());
    for (index, target) in targets.iter().cloned().enumerate() {
        let executor = Arc::clone(&executor);
        let payload = Arc::clone(&payload);
        let tx = tx.clone();
        handles.push(tokio::spawn(async move {
            let outcome = executor.execute(&target, &payload).await;
            debug!(host = %target.id(), status = %outcome.status(), "target finished");
            // The receiver outlives every sender.
            let _ = tx.send((index, outcome)).await;
        }));
    }
    drop(tx);

    let mut reported = vec![false; targets.len()];
    let mut outcomes = Vec::with_capacity(targets.len());
    while let Some((index, outcome)) = rx.recv().await {
        reported[index] = true;
        observe(&outcome);
        outcomes.push(outcome);
    }

    for (index, handle) in handles.into_iter().enumerate() {
        if let Err(e) = handle.await {
            warn!(host = %targets[index].id(), %e, "execution task did not complete");
        }
    }

    for (index, target) in targets.iter().enumerate() {
        if !reported[index] {
            let outcome = Outcome::failed(target.id(), "", ABORTED_TASK_ERROR);
            observe(&outcome);
            outcomes.push(outcome);
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    info!(
        succeeded = outcomes.len() - failed,
        failed, "fan-out complete"
    );
    outcomes
}
