//! Shared fakes for executor integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{Outcome, Payload, Target};
use executor::RemoteExecutor;

/// Pretends to be a fleet of hosts.
///
/// - addresses starting with `down` refuse connections
/// - addresses starting with `panic` crash the task
/// - addresses starting with `slow` take 200ms
/// - everything else runs `echo <text>` and fails any other command
#[derive(Default)]
pub struct FakeFleet {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
}

impl FakeFleet {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExecutor for FakeFleet {
    async fn execute(&self, target: &Target, payload: &Payload) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(target.address.clone());

        if target.address.starts_with("down") {
            return Outcome::failed(target.id(), "", "failed to connect: connection refused");
        }
        if target.address.starts_with("panic") {
            panic!("simulated crash on {}", target.address);
        }
        if target.address.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        match payload {
            Payload::Command(cmd) => match cmd.strip_prefix("echo ") {
                Some(text) => Outcome::success(target.id(), format!("{text}\n")),
                None => Outcome::failed(
                    target.id(),
                    format!("sh: {cmd}: not found\n"),
                    "process exited with status 127",
                ),
            },
            Payload::Playbook(_) => Outcome::success(target.id(), "ok=1 changed=0\n"),
        }
    }
}

pub fn target(address: &str) -> Target {
    Target::new(address, 22, "root", "pw").unwrap()
}

pub fn targets(addresses: &[&str]) -> Vec<Target> {
    addresses.iter().map(|a| target(a)).collect()
}
