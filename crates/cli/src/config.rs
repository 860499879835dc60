//! TOML configuration and host inventory.
//!
//! Default location: `~/.config/shellfleet/config.toml`. A missing file is
//! not an error; every section falls back to its defaults and the inventory
//! is empty.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::{Target, TargetSource, DEFAULT_SSH_PORT};
use executor::PlaybookRunner;
use serde::Deserialize;
use ssh::SshConfig;
use tracing::debug;

use crate::error::{CliError, Result};

const APP_DIR: &str = "shellfleet";

/// `~/.config/shellfleet/config.toml`, or `./config.toml` without a config dir.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("config.toml")
}

/// `~/.local/share/shellfleet/ledger.db`, or `./ledger.db`.
pub fn default_ledger_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ledger.db")
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ssh: SshSection,
    pub playbook: PlaybookSection,
    pub ledger: LedgerSection,
    pub serve: ServeSection,
    pub groups: Vec<GroupConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SshSection {
    pub connect_timeout_secs: u64,
    pub auth_timeout_secs: u64,
    /// 0 lets commands run forever.
    pub command_timeout_secs: u64,
    pub term: String,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            auth_timeout_secs: 30,
            command_timeout_secs: 300,
            term: "xterm-256color".to_string(),
        }
    }
}

impl SshSection {
    pub fn to_ssh_config(&self) -> SshConfig {
        SshConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            auth_timeout: Duration::from_secs(self.auth_timeout_secs),
            command_timeout: (self.command_timeout_secs > 0)
                .then(|| Duration::from_secs(self.command_timeout_secs)),
            term: self.term.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PlaybookSection {
    pub program: String,
    pub task_timeout_secs: u64,
    /// Inventory group name the playbook's plays are pointed at.
    pub scope: String,
}

impl Default for PlaybookSection {
    fn default() -> Self {
        Self {
            program: "ansible-playbook".to_string(),
            task_timeout_secs: 30,
            scope: "targets".to_string(),
        }
    }
}

impl PlaybookSection {
    pub fn to_runner(&self) -> PlaybookRunner {
        PlaybookRunner::new(
            self.program.clone(),
            Duration::from_secs(self.task_timeout_secs),
            self.scope.clone(),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServeSection {
    pub listen: SocketAddr,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 7681)),
        }
    }
}

/// A named group of hosts sharing default credentials.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub name: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub hosts: Vec<HostEntry>,
}

fn default_username() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Either `"10.0.0.1"` or `{ address = "10.0.0.1", port = 2222 }`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum HostEntry {
    Address(String),
    Detailed {
        address: String,
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

impl HostEntry {
    fn address(&self) -> &str {
        match self {
            Self::Address(address) | Self::Detailed { address, .. } => address,
        }
    }
}

impl GroupConfig {
    /// Hosts in file order, with group defaults filled in.
    fn targets(&self) -> common::Result<Vec<Target>> {
        let mut targets = Vec::with_capacity(self.hosts.len());
        for host in &self.hosts {
            if host.address().trim().is_empty() {
                debug!(group = %self.name, "skipping blank host entry");
                continue;
            }
            let target = match host {
                HostEntry::Address(address) => {
                    Target::new(address.as_str(), self.port, self.username.as_str(), self.password.as_str())?
                }
                HostEntry::Detailed {
                    address,
                    port,
                    username,
                    password,
                } => Target::new(
                    address.as_str(),
                    port.unwrap_or(self.port),
                    username.as_deref().unwrap_or(&self.username),
                    password.as_deref().unwrap_or(&self.password),
                )?,
            };
            targets.push(target);
        }
        Ok(targets)
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(CliError::ReadFile {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| CliError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `--database` wins over `[ledger] path`, which wins over the default.
    pub fn ledger_path(&self, cli_override: Option<&Path>) -> PathBuf {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.ledger.path.clone())
            .unwrap_or_else(default_ledger_path)
    }

    pub fn inventory(&self) -> Inventory {
        Inventory {
            groups: self.groups.clone(),
        }
    }
}

/// The `[[groups]]` tables as a [`TargetSource`].
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    groups: Vec<GroupConfig>,
}

impl TargetSource for Inventory {
    fn resolve(&self, group: &str) -> common::Result<Vec<Target>> {
        self.groups
            .iter()
            .find(|g| g.name == group)
            .ok_or_else(|| common::Error::UnknownGroup(group.to_string()))?
            .targets()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[ssh]
connect_timeout_secs = 5
command_timeout_secs = 0

[playbook]
program = "/opt/ansible/bin/ansible-playbook"

[serve]
listen = "0.0.0.0:9000"

[[groups]]
name = "web"
username = "deploy"
password = "hunter2"
hosts = [
    "10.0.0.1",
    "  ",
    { address = "10.0.0.2", port = 2222, password = "other" },
]

[[groups]]
name = "empty"
"#;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.groups.is_empty());
        assert_eq!(config.serve.listen.to_string(), "127.0.0.1:7681");
    }

    #[test]
    fn sections_override_defaults() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        let ssh = config.ssh.to_ssh_config();
        assert_eq!(ssh.connect_timeout, Duration::from_secs(5));
        assert_eq!(ssh.auth_timeout, Duration::from_secs(30));
        assert_eq!(ssh.command_timeout, None);
        assert_eq!(ssh.term, "xterm-256color");

        assert_eq!(config.playbook.program, "/opt/ansible/bin/ansible-playbook");
        assert_eq!(config.playbook.scope, "targets");
        assert_eq!(config.serve.listen.port(), 9000);
    }

    #[test]
    fn inventory_fills_group_defaults() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let inventory = config.inventory();

        let web = inventory.resolve("web").unwrap();
        assert_eq!(web.len(), 2);
        assert_eq!(web[0].address, "10.0.0.1");
        assert_eq!(web[0].port, 22);
        assert_eq!(web[0].username, "deploy");
        assert_eq!(web[0].secret(), "hunter2");
        assert_eq!(web[1].port, 2222);
        assert_eq!(web[1].username, "deploy");
        assert_eq!(web[1].secret(), "other");

        assert!(inventory.resolve("empty").unwrap().is_empty());
        assert!(matches!(
            inventory.resolve("db"),
            Err(common::Error::UnknownGroup(g)) if g == "db"
        ));
    }

    #[test]
    fn resolve_addresses_skips_strangers() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        let found = config
            .inventory()
            .resolve_addresses("web", &["10.0.0.2".into(), "10.9.9.9".into()])
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].port, 2222);
    }

    #[test]
    fn bad_toml_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ssh]\nconnect_timeout_secs = \"soon\"\n").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, CliError::ParseConfig { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn ledger_path_precedence() {
        let mut config = Config::default();
        assert_eq!(config.ledger_path(None), default_ledger_path());

        config.ledger.path = Some(PathBuf::from("/srv/ledger.db"));
        assert_eq!(config.ledger_path(None), PathBuf::from("/srv/ledger.db"));
        assert_eq!(
            config.ledger_path(Some(Path::new("/tmp/x.db"))),
            PathBuf::from("/tmp/x.db")
        );
    }
}
