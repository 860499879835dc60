use russh::client::Handler;
use russh::keys::{HashAlg, PublicKey};
use tracing::debug;

/// russh callback handler.
///
/// Host keys are not verified: targets come from an operator-managed
/// inventory, the same trust model as `StrictHostKeyChecking=no`.
#[derive(Debug, Default)]
pub struct ClientHandler {
    host: String,
}

impl ClientHandler {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "accepting server host key"
        );
        Ok(true)
    }
}
