use common::Outcome;
use ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("no targets to run on")]
    NoTargets,

    #[error("canary rollout needs at least 2 targets, got {available}")]
    CanaryNotApplicable { available: usize },

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid playbook: {0}")]
    InvalidPlaybook(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The remote work finished but its rows did not all reach the ledger.
    #[error("ran on {} targets but failed to record outcomes: {source}", .outcomes.len())]
    Unrecorded {
        outcomes: Vec<Outcome>,
        #[source]
        source: Box<ExecutorError>,
    },

    #[error("ledger writer stopped: {0}")]
    Writer(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// True for errors raised before any remote work started.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoTargets
                | Self::CanaryNotApplicable { .. }
                | Self::Ledger(LedgerError::SessionNotFound { .. })
                | Self::Ledger(LedgerError::OwnerNotFound { .. })
        )
    }

    /// Outcomes of a run whose rows could not all be recorded.
    pub fn unrecorded_outcomes(&self) -> Option<&[Outcome]> {
        match self {
            Self::Unrecorded { outcomes, .. } => Some(outcomes),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
