use common::OwnerKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session '{name}' not found for {owner}")]
    SessionNotFound { owner: String, name: String },

    #[error("{kind} '{name}' has no recorded sessions")]
    OwnerNotFound { kind: OwnerKind, name: String },

    #[error("ledger lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, LedgerError>;
