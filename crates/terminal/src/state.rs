use crate::error::{BridgeError, Result};

/// Lifecycle of one bridged terminal.
///
/// ```text
/// Connecting -> Authenticating -> PtyRequested -> ShellActive -> Closing -> Closed
/// ```
///
/// Any live state may jump straight to `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeState {
    Connecting,
    Authenticating,
    PtyRequested,
    ShellActive,
    Closing,
    Closed,
}

impl BridgeState {
    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(self, next: BridgeState) -> Result<BridgeState> {
        use BridgeState::*;
        let allowed = matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, PtyRequested)
                | (PtyRequested, ShellActive)
                | (Closing, Closed)
        ) || (next == Closing && !matches!(self, Closing | Closed));

        if allowed {
            Ok(next)
        } else {
            Err(BridgeError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == BridgeState::Closed
    }
}
