use async_trait::async_trait;
use common::{Outcome, Payload, Target};

use crate::playbook::{PlaybookExecutor, PlaybookRunner};
use crate::ssh::SshExecutor;
use crate::RemoteExecutor;

/// Routes each payload to the executor that understands it.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    ssh: SshExecutor,
    playbooks: PlaybookExecutor,
}

impl Dispatcher {
    pub fn new(ssh: SshExecutor, runner: PlaybookRunner) -> Self {
        Self {
            ssh,
            playbooks: PlaybookExecutor::new(runner),
        }
    }
}

#[async_trait]
impl RemoteExecutor for Dispatcher {
    async fn execute(&self, target: &Target, payload: &Payload) -> Outcome {
        match payload {
            Payload::Command(_) => self.ssh.execute(target, payload).await,
            Payload::Playbook(_) => self.playbooks.execute(target, payload).await,
        }
    }
}
