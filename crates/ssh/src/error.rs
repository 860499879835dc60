use thiserror::Error;

/// Errors that can occur while talking to a single remote host.
#[derive(Error, Debug)]
pub enum SshError {
    #[error("failed to connect: {0}")]
    Connection(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("SSH channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SshError>;
