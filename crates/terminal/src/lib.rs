//! Interactive terminal bridge.
//!
//! A client speaking the JSON terminal protocol (see the `protocol` crate) is
//! attached to a PTY shell on one remote host. [`bridge::run`] is
//! transport-agnostic; [`ws`] adapts it to axum WebSockets.

pub mod bridge;
mod error;
mod state;
mod utf8;
pub mod ws;

pub use bridge::{
    BridgeExit, ClientChannel, ClientFrame, ShellOpener, SshOpener, CLIENT_QUEUE,
};
pub use error::{BridgeError, Result};
pub use state::BridgeState;
pub use utf8::Utf8Carry;
pub use ws::{bridge_websocket, TerminalService};
