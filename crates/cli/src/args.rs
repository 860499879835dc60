use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use common::{OwnerKind, Payload};

use crate::error::{CliError, Result};

/// Owner name used for `--command` runs without `--name`.
pub const ADHOC_OWNER: &str = "adhoc";

#[derive(Parser, Debug)]
#[command(
    name = "shellfleet",
    version,
    about = "Run commands, scripts and playbooks across groups of hosts"
)]
pub struct Cli {
    /// Config file with host groups and connection settings
    #[arg(long, global = true, env = "SHELLFLEET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Session ledger database (overrides `[ledger] path`)
    #[arg(long, global = true, env = "SHELLFLEET_DB")]
    pub database: Option<PathBuf>,

    /// Also log to stderr, at debug level
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    /// How results are printed
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a command or script on every host in a group
    Exec(ExecArgs),
    /// Run on one random host of a group and stop
    Canary(CanaryArgs),
    /// Finish a canary rollout on the remaining hosts
    Continue(ContinueArgs),
    /// Run a playbook against every host in a group
    Playbook(PlaybookArgs),
    /// List recorded sessions for a script or playbook
    Sessions(SessionsArgs),
    /// Show the log rows of one session
    Logs(LogsArgs),
    /// Serve interactive terminals over WebSocket
    Serve(ServeArgs),
    /// Test SSH login on every host of a group without running anything
    Check(CheckArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("script_source").required(true).args(["command", "script"])))]
pub struct ScriptSource {
    /// Shell command to run
    #[arg(long)]
    pub command: Option<String>,

    /// Script file whose contents are sent as the command
    #[arg(long)]
    pub script: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("payload_source")
        .required(true)
        .args(["command", "script", "playbook"])
))]
pub struct PayloadSource {
    /// Shell command to run
    #[arg(long)]
    pub command: Option<String>,

    /// Script file whose contents are sent as the command
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Playbook file
    #[arg(long)]
    pub playbook: Option<PathBuf>,

    /// YAML variables for the playbook
    #[arg(long, conflicts_with_all = ["command", "script"])]
    pub vars: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Host group to run on
    #[arg(long)]
    pub group: String,

    #[command(flatten)]
    pub source: ScriptSource,

    /// Name to record the run under (defaults to the file stem)
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct CanaryArgs {
    #[arg(long)]
    pub group: String,

    #[command(flatten)]
    pub source: PayloadSource,

    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct ContinueArgs {
    #[arg(long)]
    pub group: String,

    /// Canary session printed by `shellfleet canary`
    #[arg(long)]
    pub session: String,

    /// Comma-separated addresses still to run on
    #[arg(long, value_delimiter = ',', required = true)]
    pub remaining: Vec<String>,

    #[command(flatten)]
    pub source: PayloadSource,

    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct PlaybookArgs {
    #[arg(long)]
    pub group: String,

    /// Playbook file
    #[arg(long)]
    pub file: PathBuf,

    /// YAML variables for the playbook
    #[arg(long)]
    pub vars: Option<PathBuf>,

    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args, Debug)]
pub struct SessionsArgs {
    /// Script or playbook name
    #[arg(long)]
    pub name: String,

    /// Look up a playbook rather than a script
    #[arg(long, default_value_t = false)]
    pub playbook: bool,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub session: String,

    #[arg(long, default_value_t = false)]
    pub playbook: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[arg(long)]
    pub group: String,

    /// Only check this host (address, or address:port)
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Listen address (overrides `[serve] listen`)
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

// ---------------------------------------------------------------------------
// Payload loading
// ---------------------------------------------------------------------------

/// A payload plus the owner it is recorded against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedPayload {
    pub payload: Payload,
    pub owner: String,
}

impl LoadedPayload {
    pub fn kind(&self) -> OwnerKind {
        self.payload.kind()
    }
}

impl ScriptSource {
    pub fn load(&self, name: Option<&str>) -> Result<LoadedPayload> {
        load_script(self.command.as_deref(), self.script.as_deref(), name)
    }
}

impl PayloadSource {
    pub fn load(&self, name: Option<&str>) -> Result<LoadedPayload> {
        match &self.playbook {
            Some(file) => load_playbook(file, self.vars.as_deref(), name),
            None => load_script(self.command.as_deref(), self.script.as_deref(), name),
        }
    }
}

impl PlaybookArgs {
    pub fn load(&self) -> Result<LoadedPayload> {
        load_playbook(&self.file, self.vars.as_deref(), self.name.as_deref())
    }
}

fn load_script(
    command: Option<&str>,
    script: Option<&Path>,
    name: Option<&str>,
) -> Result<LoadedPayload> {
    let (text, default_owner) = match (command, script) {
        (_, Some(file)) => (read_file(file)?, file_stem(file)),
        (Some(command), None) => (command.to_string(), ADHOC_OWNER.to_string()),
        // clap's argument group rules this out.
        (None, None) => (String::new(), ADHOC_OWNER.to_string()),
    };
    Ok(LoadedPayload {
        payload: Payload::command(text),
        owner: name.map(str::to_string).unwrap_or(default_owner),
    })
}

fn load_playbook(file: &Path, vars: Option<&Path>, name: Option<&str>) -> Result<LoadedPayload> {
    let body = read_file(file)?;
    let variables = match vars {
        Some(vars) => read_file(vars)?,
        None => String::new(),
    };
    Ok(LoadedPayload {
        payload: Payload::playbook(body, variables),
        owner: name.map(str::to_string).unwrap_or_else(|| file_stem(file)),
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| ADHOC_OWNER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exec_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["shellfleet", "exec", "--group", "web"]).is_err());
        assert!(Cli::try_parse_from([
            "shellfleet", "exec", "--group", "web", "--command", "id", "--script", "x.sh",
        ])
        .is_err());
        assert!(
            Cli::try_parse_from(["shellfleet", "exec", "--group", "web", "--command", "id"]).is_ok()
        );
    }

    #[test]
    fn continue_splits_remaining() {
        let cli = Cli::try_parse_from([
            "shellfleet",
            "continue",
            "--group",
            "web",
            "--session",
            "deploy_canary_2024-03-01_10:00:00",
            "--remaining",
            "10.0.0.2,10.0.0.3",
            "--command",
            "uptime",
            "--output",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        let Command::Continue(args) = cli.command else {
            panic!("expected continue");
        };
        assert_eq!(args.remaining, vec!["10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn vars_needs_a_playbook() {
        for source in ["--command", "--script"] {
            assert!(Cli::try_parse_from([
                "shellfleet", "canary", "--group", "web", source, "id", "--vars", "v.yml",
            ])
            .is_err());
        }
        assert!(
            Cli::try_parse_from(["shellfleet", "canary", "--group", "web", "--vars", "v.yml"])
                .is_err()
        );
        let cli = Cli::try_parse_from([
            "shellfleet", "canary", "--group", "web", "--playbook", "site.yml", "--vars", "v.yml",
        ])
        .unwrap();
        let Command::Canary(args) = cli.command else {
            panic!("expected canary");
        };
        assert_eq!(args.source.vars, Some(PathBuf::from("v.yml")));
    }

    #[test]
    fn check_takes_an_optional_host() {
        let cli = Cli::try_parse_from(["shellfleet", "check", "--group", "web"]).unwrap();
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.group, "web");
        assert_eq!(args.host, None);

        let cli = Cli::try_parse_from([
            "shellfleet", "check", "--group", "web", "--host", "10.0.0.2:2222",
        ])
        .unwrap();
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.host.as_deref(), Some("10.0.0.2:2222"));
        assert!(Cli::try_parse_from(["shellfleet", "check"]).is_err());
    }

    #[test]
    fn command_owner_defaults_to_adhoc() {
        let source = ScriptSource {
            command: Some("uptime".into()),
            script: None,
        };
        let loaded = source.load(None).unwrap();
        assert_eq!(loaded.owner, ADHOC_OWNER);
        assert_eq!(loaded.payload, Payload::command("uptime"));
        assert_eq!(source.load(Some("health")).unwrap().owner, "health");
    }

    #[test]
    fn files_name_their_owner() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("restart-nginx.sh");
        std::fs::write(&script, "systemctl restart nginx\n").unwrap();
        let playbook = dir.path().join("site.yml");
        std::fs::write(&playbook, "- hosts: all\n  tasks: []\n").unwrap();
        let vars = dir.path().join("vars.yml");
        std::fs::write(&vars, "version: 2\n").unwrap();

        let loaded = ScriptSource {
            command: None,
            script: Some(script),
        }
        .load(None)
        .unwrap();
        assert_eq!(loaded.owner, "restart-nginx");
        assert_eq!(loaded.kind(), OwnerKind::Script);
        assert_eq!(loaded.payload, Payload::command("systemctl restart nginx\n"));

        let loaded = PayloadSource {
            command: None,
            script: None,
            playbook: Some(playbook),
            vars: Some(vars),
        }
        .load(None)
        .unwrap();
        assert_eq!(loaded.owner, "site");
        assert_eq!(
            loaded.payload,
            Payload::playbook("- hosts: all\n  tasks: []\n", "version: 2\n")
        );
    }

    #[test]
    fn unreadable_file_is_reported() {
        let err = PlaybookArgs {
            group: "web".into(),
            file: PathBuf::from("/nonexistent/site.yml"),
            vars: None,
            name: None,
        }
        .load()
        .unwrap_err();
        assert!(matches!(err, CliError::ReadFile { .. }));
        assert!(err.to_string().contains("site.yml"));
    }
}
