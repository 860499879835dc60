mod support;

use std::collections::HashMap;
use std::sync::Arc;

use common::{Payload, Status};
use executor::{run_all, ABORTED_TASK_ERROR};

use crate::support::{targets, FakeFleet};

#[tokio::test]
#[ntest::timeout(5000)]
async fn echo_on_two_targets_succeeds_twice() {
    let fleet = Arc::new(FakeFleet::default());
    let outcomes = run_all(
        fleet.clone(),
        &targets(&["10.0.0.1", "10.0.0.2"]),
        &Payload::command("echo hi"),
        |_| {},
    )
    .await;

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert_eq!(outcome.status(), Status::Success);
        assert!(outcome.output().contains("hi"));
        assert!(outcome.error().is_empty());
    }
    assert_eq!(fleet.calls(), 2);
}

#[tokio::test]
#[ntest::timeout(5000)]
async fn unreachable_target_does_not_affect_others() {
    let fleet = Arc::new(FakeFleet::default());
    let outcomes = run_all(
        fleet,
        &targets(&["10.0.0.1", "down-1", "10.0.0.3"]),
        &Payload::command("echo hi"),
        |_| {},
    )
    .await;

    assert_eq!(outcomes.len(), 3);
    let by_target: HashMap<_, _> = outcomes.iter().map(|o| (o.target().to_string(), o)).collect();
    assert!(by_target["10.0.0.1"].is_success());
    assert!(by_target["10.0.0.3"].is_success());
    let down = by_target["down-1"];
    assert_eq!(down.status(), Status::Failed);
    assert!(!down.error().is_empty());
}

#[tokio::test]
#[ntest::timeout(5000)]
async fn results_arrive_in_completion_order() {
    let fleet = Arc::new(FakeFleet::default());
    let mut observed = Vec::new();
    let outcomes = run_all(
        fleet,
        &targets(&["slow-1", "10.0.0.2"]),
        &Payload::command("echo hi"),
        |o| observed.push(o.target().to_string()),
    )
    .await;

    let order: Vec<_> = outcomes.iter().map(|o| o.target().to_string()).collect();
    assert_eq!(order, vec!["10.0.0.2", "slow-1"]);
    assert_eq!(observed, order);
}

#[tokio::test]
#[ntest::timeout(5000)]
async fn panicking_task_still_yields_an_outcome() {
    let fleet = Arc::new(FakeFleet::default());
    let outcomes = run_all(
        fleet,
        &targets(&["10.0.0.1", "panic-2"]),
        &Payload::command("echo hi"),
        |_| {},
    )
    .await;

    assert_eq!(outcomes.len(), 2);
    let crashed = outcomes.iter().find(|o| o.target() == "panic-2").unwrap();
    assert_eq!(crashed.status(), Status::Failed);
    assert_eq!(crashed.error(), ABORTED_TASK_ERROR);
}

#[tokio::test]
#[ntest::timeout(5000)]
async fn duplicate_targets_run_independently() {
    let fleet = Arc::new(FakeFleet::default());
    let outcomes = run_all(
        fleet.clone(),
        &targets(&["10.0.0.1", "10.0.0.1", "10.0.0.1"]),
        &Payload::command("echo hi"),
        |_| {},
    )
    .await;
    assert_eq!(outcomes.len(), 3);
    assert_eq!(fleet.calls(), 3);
}

#[tokio::test]
async fn empty_target_list_runs_nothing() {
    let fleet = Arc::new(FakeFleet::default());
    let outcomes = run_all(fleet.clone(), &[], &Payload::command("echo hi"), |_| {}).await;
    assert!(outcomes.is_empty());
    assert_eq!(fleet.calls(), 0);
}

#[tokio::test]
#[ntest::timeout(5000)]
async fn outcome_count_matches_target_count() {
    let fleet = Arc::new(FakeFleet::default());
    let addresses: Vec<String> = (0..50).map(|i| format!("10.1.0.{i}")).collect();
    let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    let outcomes = run_all(fleet, &targets(&refs), &Payload::command("uptime"), |_| {}).await;
    assert_eq!(outcomes.len(), 50);
    assert!(outcomes.iter().all(|o| o.status() == Status::Failed));
    assert!(outcomes.iter().all(|o| o.output().contains("not found")));
}
