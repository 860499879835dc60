//! SSH transport for shellfleet.
//!
//! Password-authenticated sessions built on russh, with two uses:
//! run one command to completion ([`execute`], [`SshSession::exec`]) or
//! drive an interactive PTY shell ([`SshSession::open_shell`]).

mod client;
mod error;
mod handler;
mod shell;

pub use client::{execute, ExecOutput, PendingAuth, SshConfig, SshSession};
pub use error::{Result, SshError};
pub use shell::{ShellCommand, ShellEvent, ShellHandle, SHELL_QUEUE};
