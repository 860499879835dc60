use std::sync::Arc;

use common::{Outcome, Payload, Target};
use rand::Rng;
use tracing::info;

use crate::error::{ExecutorError, Result};
use crate::fanout::run_all;
use crate::RemoteExecutor;

/// A target set split into the canary and everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanarySplit {
    pub chosen: Target,
    pub remaining: Vec<Target>,
}

/// Result of running the canary.
#[derive(Debug, Clone)]
pub struct CanaryRun {
    pub chosen: Target,
    pub remaining: Vec<Target>,
    pub outcome: Outcome,
}

/// Pick one target uniformly at random.
///
/// Fewer than two targets leaves nothing to continue with, so the rollout is
/// rejected outright.
pub fn select_canary<R: Rng + ?Sized>(targets: &[Target], rng: &mut R) -> Result<CanarySplit> {
    if targets.len() < 2 {
        return Err(ExecutorError::CanaryNotApplicable {
            available: targets.len(),
        });
    }
    let index = rng.gen_range(0..targets.len());
    let mut remaining = targets.to_vec();
    let chosen = remaining.remove(index);
    Ok(CanarySplit { chosen, remaining })
}

/// Run `payload` on one randomly chosen target.
pub async fn run_canary<E>(
    executor: &E,
    targets: &[Target],
    payload: &Payload,
) -> Result<CanaryRun>
where
    E: RemoteExecutor + ?Sized,
{
    let CanarySplit { chosen, remaining } = select_canary(targets, &mut rand::thread_rng())?;
    info!(
        canary = %chosen.id(),
        remaining = remaining.len(),
        "running canary"
    );
    let outcome = executor.execute(&chosen, payload).await;
    Ok(CanaryRun {
        chosen,
        remaining,
        outcome,
    })
}

/// Finish a rollout on exactly `remaining`.
pub async fn continue_rollout<E>(
    executor: Arc<E>,
    remaining: &[Target],
    payload: &Payload,
) -> Result<Vec<Outcome>>
where
    E: RemoteExecutor + ?Sized + 'static,
{
    if remaining.is_empty() {
        return Err(ExecutorError::NoTargets);
    }
    Ok(run_all(executor, remaining, payload, |_| {}).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn targets(n: usize) -> Vec<Target> {
        (0..n)
            .map(|i| Target::new(format!("10.0.0.{i}"), 22, "root", "pw").unwrap())
            .collect()
    }

    #[test]
    fn rejects_single_target() {
        let mut rng = StdRng::seed_from_u64(7);
        let err = select_canary(&targets(1), &mut rng).unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::CanaryNotApplicable { available: 1 }
        ));
    }

    #[test]
    fn rejects_empty_set() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(select_canary(&[], &mut rng).is_err());
    }

    #[test]
    fn five_targets_leave_four() {
        let all = targets(5);
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let split = select_canary(&all, &mut rng).unwrap();
            assert_eq!(split.remaining.len(), 4);
            assert!(!split.remaining.contains(&split.chosen));
            assert!(all.contains(&split.chosen));
        }
    }

    #[test]
    fn remaining_keeps_input_order() {
        let all = targets(4);
        let mut rng = StdRng::seed_from_u64(3);
        let split = select_canary(&all, &mut rng).unwrap();
        let expected: Vec<_> = all.iter().filter(|t| **t != split.chosen).cloned().collect();
        assert_eq!(split.remaining, expected);
    }

    #[test]
    fn every_target_can_be_chosen() {
        let all = targets(3);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let split = select_canary(&all, &mut rng).unwrap();
            seen.insert(split.chosen.address);
        }
        assert_eq!(seen.len(), 3);
    }
}
