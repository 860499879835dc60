use std::fmt;

use tracing::warn;

use crate::{Error, Result};

/// Default SSH port used when a target does not specify one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// One remote machine plus the credentials needed to reach it.
///
/// The engine only borrows targets for the duration of an operation; it never
/// persists the secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub address: String,
    pub port: u16,
    pub username: String,
    secret: Secret,
}

impl Target {
    pub fn new(
        address: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Result<Self> {
        let address = address.into().trim().to_string();
        if address.is_empty() {
            return Err(Error::InvalidTarget("address is empty".into()));
        }
        if port == 0 {
            return Err(Error::InvalidTarget(format!("{address}: port 0 is not valid")));
        }
        Ok(Self {
            address,
            port,
            username: username.into(),
            secret: Secret::new(secret),
        })
    }

    /// The identifier recorded on outcomes and log rows.
    ///
    /// The bare address on the default port, `endpoint()` otherwise, so two
    /// hosts sharing an address on different ports stay distinct.
    pub fn id(&self) -> String {
        if self.port == DEFAULT_SSH_PORT {
            self.address.clone()
        } else {
            self.endpoint()
        }
    }

    pub fn secret(&self) -> &str {
        self.secret.expose()
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn endpoint(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.endpoint())
    }
}

/// Resolves a group identifier into the ordered list of targets it contains.
///
/// This is the seam to whatever owns host inventory (a CRUD layer, a config
/// file); the engine calls it before every fan-out.
pub trait TargetSource: Send + Sync {
    fn resolve(&self, group: &str) -> Result<Vec<Target>>;

    /// Resolve target ids against a group's credentials.
    ///
    /// An exact [`Target::id`] match wins. A bare address otherwise picks
    /// every member on that address. Entries that are not part of the group
    /// are skipped with a warning.
    fn resolve_addresses(&self, group: &str, addresses: &[String]) -> Result<Vec<Target>> {
        let members = self.resolve(group)?;
        let mut resolved = Vec::with_capacity(addresses.len());
        for address in addresses {
            let address = address.trim();
            if address.is_empty() {
                continue;
            }
            if let Some(target) = members.iter().find(|t| t.id() == address) {
                resolved.push(target.clone());
                continue;
            }
            let before = resolved.len();
            resolved.extend(members.iter().filter(|t| t.address == address).cloned());
            if resolved.len() == before {
                warn!(group, address, "address is not a member of the group, skipping");
            }
        }
        Ok(resolved)
    }
}
