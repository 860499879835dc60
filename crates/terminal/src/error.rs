use thiserror::Error;

use crate::state::BridgeState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("invalid bridge transition {from:?} -> {to:?}")]
    InvalidTransition { from: BridgeState, to: BridgeState },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
