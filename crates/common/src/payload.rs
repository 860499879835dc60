use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::Error;

/// A configuration-management playbook plus its optional variables document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playbook {
    pub body: String,
    /// YAML variables; empty when the playbook takes none.
    pub variables: String,
}

/// The work sent to targets: a shell command (or script body) or a playbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Command(String),
    Playbook(Playbook),
}

impl Payload {
    pub fn command(text: impl Into<String>) -> Self {
        Self::Command(text.into())
    }

    pub fn playbook(body: impl Into<String>, variables: impl Into<String>) -> Self {
        Self::Playbook(Playbook {
            body: body.into(),
            variables: variables.into(),
        })
    }

    pub fn kind(&self) -> OwnerKind {
        match self {
            Self::Command(_) => OwnerKind::Script,
            Self::Playbook(_) => OwnerKind::Playbook,
        }
    }
}

/// What a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Script,
    Playbook,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Playbook => "playbook",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "script" => Ok(Self::Script),
            "playbook" => Ok(Self::Playbook),
            other => Err(Error::UnknownOwnerKind(other.to_string())),
        }
    }
}

/// The script or playbook a session is recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Owner {
    pub id: i64,
    pub kind: OwnerKind,
    pub name: String,
}
