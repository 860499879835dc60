use async_trait::async_trait;
use common::{Outcome, Payload, Target};
use ssh::SshConfig;

use crate::RemoteExecutor;

/// Runs commands and scripts over a fresh SSH session per target.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, target: &Target, payload: &Payload) -> Outcome {
        match payload {
            Payload::Command(command) => ssh::execute(target, command, &self.config).await,
            Payload::Playbook(_) => {
                Outcome::failed(target.id(), "", "SSH executor cannot run a playbook")
            }
        }
    }
}
