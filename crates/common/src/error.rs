use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("host {address} is not in group {group}")]
    UnknownHost { group: String, address: String },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("unknown owner kind: {0}")]
    UnknownOwnerKind(String),

    #[error("unknown outcome status: {0}")]
    UnknownStatus(String),
}
