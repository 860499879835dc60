//! Running payloads against many targets.
//!
//! Everything here funnels through [`RemoteExecutor`], the per-target
//! primitive. [`run_all`] fans it out, [`select_canary`] and
//! [`run_canary`] implement the canary gate, [`PlaybookRunner`] drives an
//! external playbook runner, and [`Campaign`] ties runs to the session ledger.
//! [`check_all`] reuses the fan-out to test connectivity without a payload.

mod campaign;
mod canary;
mod check;
mod dispatch;
mod error;
mod fanout;
mod playbook;
mod ssh;

pub use campaign::{Campaign, CanaryReport, RunReport};
pub use check::{check_all, ConnectionCheck, CHECK_TIMEOUT};
pub use canary::{continue_rollout, run_canary, select_canary, CanaryRun, CanarySplit};
pub use dispatch::Dispatcher;
pub use error::{ExecutorError, Result};
pub use fanout::{run_all, ABORTED_TASK_ERROR};
pub use playbook::{inject_scope, render_inventory, PlaybookExecutor, PlaybookRunner};
pub use ssh::SshExecutor;

use async_trait::async_trait;
use common::{Outcome, Payload, Target};

/// Runs one payload on one target.
///
/// Implementations never fail: connection, authentication and execution
/// problems all come back as a failed [`Outcome`].
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(&self, target: &Target, payload: &Payload) -> Outcome;
}
