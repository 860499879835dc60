//! In-memory shell fakes for bridge tests.
#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use common::Target;
use protocol::WindowSize;
use ssh::{ShellCommand, ShellEvent, ShellHandle, SshError, SHELL_QUEUE};
use terminal::ShellOpener;
use tokio::sync::mpsc;

/// Which establishment step should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nowhere,
    Dial,
    Auth,
    Shell,
}

/// The remote end of a fake shell, held by the test.
pub struct RemoteEnd {
    pub commands: mpsc::Receiver<ShellCommand>,
    pub events: mpsc::Sender<ShellEvent>,
}

/// Opener that hands out one pre-wired in-memory shell.
pub struct FakeOpener {
    fail_at: FailAt,
    shell: Mutex<Option<ShellHandle>>,
    pub opened_with: Mutex<Option<WindowSize>>,
}

impl FakeOpener {
    pub fn new(fail_at: FailAt) -> (Self, RemoteEnd) {
        let (command_tx, command_rx) = mpsc::channel(SHELL_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(SHELL_QUEUE);
        let opener = Self {
            fail_at,
            shell: Mutex::new(Some(ShellHandle {
                commands: command_tx,
                events: event_rx,
            })),
            opened_with: Mutex::new(None),
        };
        let remote = RemoteEnd {
            commands: command_rx,
            events: event_tx,
        };
        (opener, remote)
    }
}

#[async_trait]
impl ShellOpener for FakeOpener {
    type Dialed = ();
    type Authenticated = ();

    async fn dial(&self, _target: &Target) -> ssh::Result<()> {
        if self.fail_at == FailAt::Dial {
            return Err(SshError::Connection("127.0.0.1:22: connection refused".into()));
        }
        Ok(())
    }

    async fn authenticate(&self, _dialed: ()) -> ssh::Result<()> {
        if self.fail_at == FailAt::Auth {
            return Err(SshError::Auth("password rejected for user 'root'".into()));
        }
        Ok(())
    }

    async fn open_shell(&self, _session: (), size: WindowSize) -> ssh::Result<ShellHandle> {
        if self.fail_at == FailAt::Shell {
            return Err(SshError::Channel("PTY request failed".into()));
        }
        *self.opened_with.lock().unwrap() = Some(size);
        self.shell
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SshError::Channel("shell already opened".into()))
    }
}

/// Remote side that echoes every input back and records everything it got.
pub fn spawn_echo(remote: RemoteEnd) -> tokio::task::JoinHandle<Vec<ShellCommand>> {
    let RemoteEnd {
        mut commands,
        events,
    } = remote;
    tokio::spawn(async move {
        let mut received = Vec::new();
        while let Some(command) = commands.recv().await {
            if let ShellCommand::Input(bytes) = &command {
                let _ = events.send(ShellEvent::Output(bytes.clone())).await;
            }
            received.push(command);
        }
        received
    })
}

pub fn target() -> Target {
    Target::new("127.0.0.1", 22, "root", "pw").unwrap()
}

pub fn output(text: &str) -> ShellEvent {
    ShellEvent::Output(Bytes::copy_from_slice(text.as_bytes()))
}
