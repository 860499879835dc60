use async_trait::async_trait;
use bytes::Bytes;
use common::Target;
use protocol::{codec, MessageKind, TerminalMessage, WindowSize};
use ssh::{PendingAuth, ShellCommand, ShellEvent, ShellHandle, SshConfig, SshSession};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::state::BridgeState;
use crate::utf8::Utf8Carry;

/// Queue depth between a client transport and the bridge, in each direction.
pub const CLIENT_QUEUE: usize = 64;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Establishes an interactive shell in three observable steps.
#[async_trait]
pub trait ShellOpener: Send + Sync {
    type Dialed: Send;
    type Authenticated: Send;

    async fn dial(&self, target: &Target) -> ssh::Result<Self::Dialed>;

    async fn authenticate(&self, dialed: Self::Dialed) -> ssh::Result<Self::Authenticated>;

    async fn open_shell(
        &self,
        session: Self::Authenticated,
        size: WindowSize,
    ) -> ssh::Result<ShellHandle>;
}

/// The real opener: russh sessions.
#[derive(Debug, Clone, Default)]
pub struct SshOpener {
    config: SshConfig,
}

impl SshOpener {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ShellOpener for SshOpener {
    type Dialed = PendingAuth;
    type Authenticated = SshSession;

    async fn dial(&self, target: &Target) -> ssh::Result<PendingAuth> {
        SshSession::dial(target, &self.config).await
    }

    async fn authenticate(&self, dialed: PendingAuth) -> ssh::Result<SshSession> {
        dialed.authenticate().await
    }

    async fn open_shell(&self, session: SshSession, size: WindowSize) -> ssh::Result<ShellHandle> {
        session.open_shell(size).await
    }
}

/// A raw frame from the client transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// One JSON text frame.
    Text(String),
    /// The transport broke.
    Failed(String),
}

/// The client side of a bridge, independent of the transport.
///
/// `inbound` ending means the client went away; dropping `outbound` tells
/// the transport to close.
#[derive(Debug)]
pub struct ClientChannel {
    pub inbound: mpsc::Receiver<ClientFrame>,
    pub outbound: mpsc::Sender<TerminalMessage>,
}

/// Why a bridge ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeExit {
    RemoteClosed,
    ClientClosed,
    RemoteError(String),
    ClientError(String),
    EstablishFailed(String),
}

// ---------------------------------------------------------------------------
// Bridge
// ---------------------------------------------------------------------------

/// Attach `client` to an interactive shell on `target` until either side
/// goes away.
///
/// The bridge owns both ends: when it returns, the remote session has been
/// told to disconnect and the client channel is closed.
#[instrument(skip_all, fields(host = %target.endpoint()))]
pub async fn run<O>(opener: &O, target: &Target, client: ClientChannel) -> BridgeExit
where
    O: ShellOpener + ?Sized,
{
    let ClientChannel {
        mut inbound,
        outbound,
    } = client;
    let mut state = BridgeState::Connecting;

    let shell = match establish(opener, target, &mut state).await {
        Ok(shell) => shell,
        Err(e) => {
            warn!(%e, ?state, "failed to establish terminal session");
            step(&mut state, BridgeState::Closing);
            let _ = outbound
                .send(TerminalMessage::error(format!("SSH connection failed: {e}")))
                .await;
            step(&mut state, BridgeState::Closed);
            return BridgeExit::EstablishFailed(e.to_string());
        }
    };

    if outbound.send(TerminalMessage::connected("")).await.is_err() {
        step(&mut state, BridgeState::Closing);
        step(&mut state, BridgeState::Closed);
        return BridgeExit::ClientClosed;
    }
    info!("terminal session active");

    let ShellHandle { commands, events } = shell;
    let exit = tokio::select! {
        exit = pump_output(events, &outbound) => exit,
        exit = pump_input(&mut inbound, &commands) => exit,
    };

    step(&mut state, BridgeState::Closing);
    // Dropping the command sender ends the shell pump, which closes the
    // channel and disconnects.
    drop(commands);
    drop(outbound);
    step(&mut state, BridgeState::Closed);
    info!(?exit, "terminal session closed");
    exit
}

async fn establish<O>(
    opener: &O,
    target: &Target,
    state: &mut BridgeState,
) -> ssh::Result<ShellHandle>
where
    O: ShellOpener + ?Sized,
{
    let dialed = opener.dial(target).await?;
    step(state, BridgeState::Authenticating);

    let session = opener.authenticate(dialed).await?;
    step(state, BridgeState::PtyRequested);

    let shell = opener.open_shell(session, WindowSize::default()).await?;
    step(state, BridgeState::ShellActive);
    Ok(shell)
}

fn step(state: &mut BridgeState, next: BridgeState) {
    match state.advance(next) {
        Ok(next) => {
            debug!(from = ?state, to = ?next, "bridge state");
            *state = next;
        }
        Err(e) => warn!(%e, "ignoring bridge transition"),
    }
}

/// Remote output -> `data` messages.
async fn pump_output(
    mut events: mpsc::Receiver<ShellEvent>,
    outbound: &mpsc::Sender<TerminalMessage>,
) -> BridgeExit {
    let mut carry = Utf8Carry::default();
    loop {
        match events.recv().await {
            Some(ShellEvent::Output(bytes)) => {
                let text = carry.push(&bytes);
                if text.is_empty() {
                    continue;
                }
                if outbound.send(TerminalMessage::data(text)).await.is_err() {
                    return BridgeExit::ClientClosed;
                }
            }
            Some(ShellEvent::Failed(reason)) => {
                let _ = outbound.send(TerminalMessage::error(reason.clone())).await;
                return BridgeExit::RemoteError(reason);
            }
            None => {
                let rest = carry.finish();
                if !rest.is_empty() {
                    let _ = outbound.send(TerminalMessage::data(rest)).await;
                }
                return BridgeExit::RemoteClosed;
            }
        }
    }
}

/// Client messages -> shell commands.
async fn pump_input(
    inbound: &mut mpsc::Receiver<ClientFrame>,
    commands: &mpsc::Sender<ShellCommand>,
) -> BridgeExit {
    loop {
        let text = match inbound.recv().await {
            Some(ClientFrame::Text(text)) => text,
            Some(ClientFrame::Failed(reason)) => return BridgeExit::ClientError(reason),
            None => return BridgeExit::ClientClosed,
        };

        let Some(command) = interpret(&text) else {
            continue;
        };
        if commands.send(command).await.is_err() {
            return BridgeExit::RemoteClosed;
        }
    }
}

/// Turn one client frame into a shell command, or `None` to drop it.
fn interpret(frame: &str) -> Option<ShellCommand> {
    let msg = match codec::decode(frame) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(%e, "dropping malformed client frame");
            return None;
        }
    };

    match msg.kind {
        MessageKind::Input if msg.data.is_empty() => None,
        MessageKind::Input => Some(ShellCommand::Input(Bytes::from(msg.data.into_bytes()))),
        MessageKind::Resize => match codec::decode_window_size(&msg) {
            Ok(size) => Some(ShellCommand::Resize(size)),
            Err(e) => {
                debug!(%e, "dropping bad resize");
                None
            }
        },
        other => {
            debug!(kind = ?other, "ignoring client message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_is_passed_verbatim() {
        assert_eq!(
            interpret(r#"{"type":"input","data":"ls\r"}"#),
            Some(ShellCommand::Input(Bytes::from_static(b"ls\r")))
        );
    }

    #[test]
    fn empty_input_is_dropped() {
        assert_eq!(interpret(r#"{"type":"input","data":""}"#), None);
    }

    #[test]
    fn resize_becomes_window_change() {
        assert_eq!(
            interpret(r#"{"type":"resize","data":"{\"cols\":100,\"rows\":40}"}"#),
            Some(ShellCommand::Resize(WindowSize { rows: 40, cols: 100 }))
        );
    }

    #[test]
    fn bad_frames_are_dropped() {
        assert_eq!(interpret("{not json"), None);
        assert_eq!(interpret(r#"{"type":"resize","data":"{\"cols\":\"x\"}"}"#), None);
        assert_eq!(interpret(r#"{"type":"resize","data":"{\"cols\":0,\"rows\":0}"}"#), None);
        assert_eq!(interpret(r#"{"type":"data","data":"spoofed"}"#), None);
        assert_eq!(interpret(r#"{"type":"ping"}"#), None);
    }
}
