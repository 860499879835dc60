use std::sync::Arc;
use std::time::Duration;

use russh::{client, ChannelMsg, Disconnect, Pty};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use common::{Outcome, Target};
use protocol::WindowSize;

use crate::error::{Result, SshError};
use crate::handler::ClientHandler;
use crate::shell::{self, ShellHandle};

/// Terminal modes requested with every interactive PTY.
const SHELL_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 1),
    (Pty::TTY_OP_ISPEED, 14_400),
    (Pty::TTY_OP_OSPEED, 14_400),
];

// ---------------------------------------------------------------------------
// SshConfig
// ---------------------------------------------------------------------------

/// Timeouts and terminal settings shared by every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    /// Limit on the TCP connect plus SSH handshake.
    pub connect_timeout: Duration,
    /// Limit on password authentication.
    pub auth_timeout: Duration,
    /// Limit on a single non-interactive command. `None` waits forever.
    pub command_timeout: Option<Duration>,
    /// `TERM` requested for interactive shells.
    pub term: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(30),
            command_timeout: Some(Duration::from_secs(300)),
            term: "xterm-256color".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection stages
// ---------------------------------------------------------------------------

/// A transport that completed the SSH handshake but has not authenticated.
pub struct PendingAuth {
    handle: client::Handle<ClientHandler>,
    target: Target,
    config: SshConfig,
}

impl PendingAuth {
    /// Authenticate with the target's password.
    pub async fn authenticate(mut self) -> Result<SshSession> {
        let secs = self.config.auth_timeout.as_secs();
        let result = tokio::time::timeout(
            self.config.auth_timeout,
            self.handle
                .authenticate_password(&self.target.username, self.target.secret()),
        )
        .await
        .map_err(|_| SshError::Timeout {
            stage: "authentication",
            secs,
        })?
        .map_err(|e| SshError::Auth(e.to_string()))?;

        if !result.success() {
            return Err(SshError::Auth(format!(
                "password rejected for user '{}'",
                self.target.username
            )));
        }

        debug!(host = %self.target, "SSH password authentication successful");
        Ok(SshSession {
            handle: self.handle,
            target: self.target,
            config: self.config,
        })
    }
}

/// Result of running one command to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// stdout and stderr interleaved in arrival order.
    pub output: String,
    pub exit_status: Option<u32>,
    pub exit_signal: Option<String>,
    /// Set when the command timeout fired before the channel closed.
    pub timed_out: Option<Duration>,
}

impl ExecOutput {
    /// Classify the run for the target it ran on.
    pub fn into_outcome(self, target: &str) -> Outcome {
        if let Some(limit) = self.timed_out {
            return Outcome::failed(
                target,
                self.output,
                format!("command timed out after {}s", limit.as_secs()),
            );
        }
        if let Some(signal) = self.exit_signal {
            return Outcome::failed(
                target,
                self.output,
                format!("process killed by signal {signal}"),
            );
        }
        match self.exit_status {
            Some(0) => Outcome::success(target, self.output),
            Some(code) => Outcome::failed(
                target,
                self.output,
                format!("process exited with status {code}"),
            ),
            None => Outcome::failed(
                target,
                self.output,
                "remote command exited without exit status or exit signal",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// SshSession
// ---------------------------------------------------------------------------

/// An authenticated SSH session to one target.
pub struct SshSession {
    handle: client::Handle<ClientHandler>,
    target: Target,
    config: SshConfig,
}

impl SshSession {
    /// Open the transport and complete the SSH handshake.
    pub async fn dial(target: &Target, config: &SshConfig) -> Result<PendingAuth> {
        let client_config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        // The tuple form resolves DNS names and takes IPv6 literals unbracketed.
        let host = target.address.trim_start_matches('[').trim_end_matches(']');
        let addr = (host, target.port);
        let handler = ClientHandler::new(target.endpoint());

        let handle = tokio::time::timeout(
            config.connect_timeout,
            client::connect(client_config, addr, handler),
        )
        .await
        .map_err(|_| SshError::Timeout {
            stage: "connect",
            secs: config.connect_timeout.as_secs(),
        })?
        .map_err(|e| SshError::Connection(format!("{}: {e}", target.endpoint())))?;

        info!(endpoint = %target.endpoint(), "SSH connection established");
        Ok(PendingAuth {
            handle,
            target: target.clone(),
            config: config.clone(),
        })
    }

    /// Dial and authenticate in one step.
    pub async fn connect(target: &Target, config: &SshConfig) -> Result<Self> {
        Self::dial(target, config).await?.authenticate().await
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Run `command` and collect its combined output.
    ///
    /// A command that outlives the configured timeout is reported through
    /// [`ExecOutput::timed_out`] together with whatever output arrived.
    pub async fn exec(&self, command: &str) -> Result<ExecOutput> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(format!("failed to open session channel: {e}")))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(format!("failed to exec command: {e}")))?;

        let deadline = self.config.command_timeout.map(|t| Instant::now() + t);
        let mut combined = Vec::new();
        let mut result = ExecOutput::default();

        // ExitStatus may arrive after Eof; only Close ends the exchange.
        loop {
            let msg = match deadline {
                Some(at) => match tokio::time::timeout_at(at, channel.wait()).await {
                    Ok(msg) => msg,
                    Err(_) => {
                        result.timed_out = self.config.command_timeout;
                        break;
                    }
                },
                None => channel.wait().await,
            };

            match msg {
                Some(ChannelMsg::Data { data }) => combined.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, .. }) => combined.extend_from_slice(&data),
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    result.exit_status = Some(exit_status);
                }
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    result.exit_signal = Some(format!("{signal_name:?}"));
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }

        if result.timed_out.is_some() {
            warn!(host = %self.target, command, "command timed out, closing channel");
            if let Err(e) = channel.close().await {
                debug!(host = %self.target, %e, "closing timed-out channel failed");
            }
        }

        result.output = String::from_utf8_lossy(&combined).into_owned();
        debug!(
            host = %self.target,
            exit_status = ?result.exit_status,
            output_len = result.output.len(),
            "SSH command completed"
        );
        Ok(result)
    }

    /// Request a PTY and a login shell, handing the channel to a pump task.
    ///
    /// The session is consumed: the returned handle owns the connection and
    /// tears it down when both of its halves are dropped.
    pub async fn open_shell(self, size: WindowSize) -> Result<ShellHandle> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::Channel(format!("failed to open session channel: {e}")))?;

        channel
            .request_pty(
                true,
                &self.config.term,
                size.cols,
                size.rows,
                0,
                0,
                SHELL_MODES,
            )
            .await
            .map_err(|e| SshError::Channel(format!("PTY request failed: {e}")))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| SshError::Channel(format!("shell request failed: {e}")))?;

        info!(host = %self.target, rows = size.rows, cols = size.cols, "interactive shell opened");
        Ok(shell::spawn_pump(self.handle, channel))
    }

    /// Disconnect politely. Errors are logged and swallowed.
    pub async fn close(self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(host = %self.target, %e, "disconnect failed");
        }
    }
}

/// Connect, authenticate and run `command` on `target`.
///
/// Never fails: every error is folded into a failed [`Outcome`].
#[instrument(skip_all, fields(host = %target.endpoint()))]
pub async fn execute(target: &Target, command: &str, config: &SshConfig) -> Outcome {
    let session = match SshSession::connect(target, config).await {
        Ok(session) => session,
        Err(e) => {
            warn!(%e, "SSH connection failed");
            return Outcome::failed(target.id(), "", e.to_string());
        }
    };

    let outcome = match session.exec(command).await {
        Ok(output) => output.into_outcome(&target.id()),
        Err(e) => Outcome::failed(target.id(), "", e.to_string()),
    };
    session.close().await;
    outcome
}
