use std::path::PathBuf;

use executor::ExecutorError;
use ledger::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Inventory(#[from] common::Error),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("failed to render output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to serve terminals on {addr}: {source}")]
    Serve {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    /// Outcomes of remote work that finished before the error.
    pub fn unrecorded_outcomes(&self) -> Option<&[common::Outcome]> {
        match self {
            Self::Executor(e) => e.unrecorded_outcomes(),
            _ => None,
        }
    }

    /// 2 when the request was refused before any remote work, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        let precondition = match self {
            Self::Executor(e) => e.is_precondition(),
            Self::Ledger(e) => matches!(
                e,
                LedgerError::SessionNotFound { .. } | LedgerError::OwnerNotFound { .. }
            ),
            Self::Inventory(e) => matches!(
                e,
                common::Error::UnknownGroup(_)
                    | common::Error::UnknownHost { .. }
                    | common::Error::InvalidTarget(_)
            ),
            Self::ReadFile { .. } | Self::ParseConfig { .. } => true,
            Self::Json(_) | Self::Serve { .. } => false,
        };
        if precondition {
            2
        } else {
            1
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
