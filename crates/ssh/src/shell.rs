use bytes::Bytes;
use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use protocol::WindowSize;

use crate::handler::ClientHandler;

/// Queue depth between the shell pump and its owner, in each direction.
pub const SHELL_QUEUE: usize = 64;

/// Instructions for the remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    /// Keystrokes written to the shell's stdin.
    Input(Bytes),
    /// New terminal dimensions.
    Resize(WindowSize),
}

/// Things the remote shell reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// A chunk of terminal output, stdout and stderr merged.
    Output(Bytes),
    /// The session broke; no further events follow.
    Failed(String),
}

/// Both halves of a live interactive shell.
///
/// The event stream ends (`recv()` returns `None`) once the remote side
/// closes. Dropping `commands` ends the session from this side.
#[derive(Debug)]
pub struct ShellHandle {
    pub commands: mpsc::Sender<ShellCommand>,
    pub events: mpsc::Receiver<ShellEvent>,
}

pub(crate) fn spawn_pump(
    handle: client::Handle<ClientHandler>,
    channel: Channel<Msg>,
) -> ShellHandle {
    let (command_tx, command_rx) = mpsc::channel(SHELL_QUEUE);
    let (event_tx, event_rx) = mpsc::channel(SHELL_QUEUE);
    tokio::spawn(pump(handle, channel, command_rx, event_tx));
    ShellHandle {
        commands: command_tx,
        events: event_rx,
    }
}

/// Single owner of the shell channel: relays commands in, output out.
async fn pump(
    handle: client::Handle<ClientHandler>,
    mut channel: Channel<Msg>,
    mut commands: mpsc::Receiver<ShellCommand>,
    events: mpsc::Sender<ShellEvent>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(ShellCommand::Input(bytes)) => {
                        if let Err(e) = channel.data(&bytes[..]).await {
                            let _ = events
                                .send(ShellEvent::Failed(format!("write to remote shell failed: {e}")))
                                .await;
                            break;
                        }
                    }
                    Some(ShellCommand::Resize(size)) => {
                        if let Err(e) = channel.window_change(size.cols, size.rows, 0, 0).await {
                            let _ = events
                                .send(ShellEvent::Failed(format!("window change failed: {e}")))
                                .await;
                            break;
                        }
                        debug!(rows = size.rows, cols = size.cols, "remote window resized");
                    }
                    None => {
                        debug!("shell owner hung up");
                        break;
                    }
                }
            }
            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { data }) | Some(ChannelMsg::ExtendedData { data, .. }) => {
                        if events.send(ShellEvent::Output(Bytes::copy_from_slice(&data))).await.is_err() {
                            debug!("shell event receiver dropped");
                            break;
                        }
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        debug!(exit_status, "remote shell exited");
                    }
                    Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                        debug!("remote shell closed");
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    if let Err(e) = channel.close().await {
        debug!(%e, "closing shell channel failed");
    }
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "", "en")
        .await
    {
        warn!(%e, "failed to disconnect shell session");
    }
}
