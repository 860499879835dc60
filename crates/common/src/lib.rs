//! Shared types for the shellfleet execution engine.
//!
//! - [`Target`]: one remote machine plus its credentials
//! - [`Payload`]: the command, script or playbook sent to targets
//! - [`Outcome`]: the per-target result of a run
//! - [`Owner`]: the script or playbook a session is recorded against

mod error;
mod outcome;
mod payload;
mod target;

pub use error::Error;
pub use outcome::{Outcome, Status};
pub use payload::{Owner, OwnerKind, Payload, Playbook};
pub use target::{Secret, Target, TargetSource, DEFAULT_SSH_PORT};

pub type Result<T> = std::result::Result<T, Error>;
