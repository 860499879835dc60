use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use common::{Outcome, Payload, Playbook, Target};
use serde_yaml::{Mapping, Value};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{ExecutorError, Result};
use crate::RemoteExecutor;

/// Keys that make a top-level mapping a play rather than a task.
const PLAY_KEYS: &[&str] = &["hosts", "tasks", "roles", "pre_tasks", "post_tasks", "import_playbook"];

/// Plays carrying one of these already know where they run.
const SCOPED_KEYS: &[&str] = &["hosts", "import_playbook", "ansible.builtin.import_playbook"];

const READ_CHUNK: usize = 4096;

// ---------------------------------------------------------------------------
// Playbook text
// ---------------------------------------------------------------------------

/// Make sure every play in `body` targets `scope`.
///
/// Plays without a `hosts` key get `hosts: <scope>` as their first key. A
/// body that is a bare task list is wrapped into a single play. The result is
/// re-emitted as YAML, after the `---` marker when the body started with one.
pub fn inject_scope(body: &str, scope: &str) -> Result<String> {
    let document: Value = if !has_content(body) {
        Value::Null
    } else {
        serde_yaml::from_str(body).map_err(|e| ExecutorError::InvalidPlaybook(e.to_string()))?
    };

    let plays = match document {
        Value::Null => vec![wrap_tasks(scope, Vec::new())],
        Value::Sequence(items) if items.iter().any(is_play) => items
            .into_iter()
            .map(|item| match item {
                Value::Mapping(play) => Value::Mapping(scope_play(play, scope)),
                other => other,
            })
            .collect(),
        Value::Sequence(tasks) => vec![wrap_tasks(scope, tasks)],
        Value::Mapping(play) if is_play_mapping(&play) => {
            vec![Value::Mapping(scope_play(play, scope))]
        }
        task => vec![wrap_tasks(scope, vec![task])],
    };

    let mut text = serde_yaml::to_string(&Value::Sequence(plays))
        .map_err(|e| ExecutorError::InvalidPlaybook(e.to_string()))?;
    if starts_with_marker(body) {
        text.insert_str(0, "---\n");
    }
    Ok(text)
}

/// False for bodies holding nothing but blank lines, comments and markers.
fn has_content(body: &str) -> bool {
    body.lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#') && line != "---" && line != "...")
}

fn starts_with_marker(body: &str) -> bool {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .is_some_and(|line| line == "---" || line.starts_with("--- "))
}

fn is_play(item: &Value) -> bool {
    item.as_mapping().is_some_and(is_play_mapping)
}

fn is_play_mapping(mapping: &Mapping) -> bool {
    PLAY_KEYS.iter().any(|key| mapping.contains_key(*key))
}

/// `play` with `hosts: scope` in front, unless it is already scoped.
fn scope_play(play: Mapping, scope: &str) -> Mapping {
    if SCOPED_KEYS.iter().any(|key| play.contains_key(*key)) {
        return play;
    }
    let mut scoped = Mapping::with_capacity(play.len() + 1);
    scoped.insert("hosts".into(), scope.into());
    scoped.extend(play);
    scoped
}

fn wrap_tasks(scope: &str, tasks: Vec<Value>) -> Value {
    let mut play = Mapping::new();
    play.insert("hosts".into(), scope.into());
    play.insert("tasks".into(), Value::Sequence(tasks));
    Value::Mapping(play)
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// INI inventory with one host line per target under `[scope]`.
pub fn render_inventory(targets: &[Target], scope: &str) -> String {
    let mut inventory = format!("[{scope}]\n");
    for target in targets {
        inventory.push_str(&format!(
            "{} ansible_user={} ansible_password={} ansible_port={} \
             ansible_ssh_common_args='-o StrictHostKeyChecking=no'\n",
            target.address,
            ini_value(&target.username),
            ini_value(target.secret()),
            target.port,
        ));
    }
    inventory
}

fn ini_value(value: &str) -> Cow<'_, str> {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '#' | ';' | '='));
    if !needs_quotes {
        return Cow::Borrowed(value);
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    Cow::Owned(format!("\"{escaped}\""))
}

/// The ephemeral files one runner invocation needs.
///
/// Everything lives in a private temporary directory that is removed when
/// this value is dropped.
struct Workspace {
    dir: TempDir,
    has_vars: bool,
}

impl Workspace {
    fn create(targets: &[Target], playbook: &Playbook, scope: &str) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("shellfleet-").tempdir()?;

        write_private(&dir.path().join("inventory"), &render_inventory(targets, scope))?;
        std::fs::write(
            dir.path().join("playbook.yml"),
            inject_scope(&playbook.body, scope)?,
        )?;

        let has_vars = !playbook.variables.trim().is_empty();
        if has_vars {
            std::fs::write(dir.path().join("vars.yml"), &playbook.variables)?;
        }

        debug!(dir = %dir.path().display(), "playbook workspace created");
        Ok(Self { dir, has_vars })
    }

    fn inventory(&self) -> PathBuf {
        self.dir.path().join("inventory")
    }

    fn playbook(&self) -> PathBuf {
        self.dir.path().join("playbook.yml")
    }

    fn vars(&self) -> Option<PathBuf> {
        self.has_vars.then(|| self.dir.path().join("vars.yml"))
    }
}

/// Write a file readable only by the current user.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())
}

// ---------------------------------------------------------------------------
// PlaybookRunner
// ---------------------------------------------------------------------------

/// Drives an external `ansible-playbook`-compatible program.
#[derive(Debug, Clone)]
pub struct PlaybookRunner {
    program: String,
    task_timeout: Duration,
    scope: String,
}

impl Default for PlaybookRunner {
    fn default() -> Self {
        Self::new("ansible-playbook", Duration::from_secs(30), "targets")
    }
}

impl PlaybookRunner {
    pub fn new(program: impl Into<String>, task_timeout: Duration, scope: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            task_timeout,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Run `playbook` once across all `targets` and return one aggregate
    /// outcome labelled with the comma-joined target addresses.
    #[instrument(skip_all, fields(program = %self.program, targets = targets.len()))]
    pub async fn run(&self, targets: &[Target], playbook: &Playbook) -> Outcome {
        let label = targets
            .iter()
            .map(|t| t.id())
            .collect::<Vec<_>>()
            .join(",");
        match self.try_run(targets, playbook).await {
            Ok((output, Ok(()))) => Outcome::success(label, output),
            Ok((output, Err(reason))) => Outcome::failed(label, output, reason),
            Err(e) => {
                warn!(%e, "playbook run failed");
                Outcome::failed(label, "", e.to_string())
            }
        }
    }

    async fn try_run(
        &self,
        targets: &[Target],
        playbook: &Playbook,
    ) -> Result<(String, std::result::Result<(), String>)> {
        if targets.is_empty() {
            return Err(ExecutorError::NoTargets);
        }
        let workspace = Workspace::create(targets, playbook, &self.scope)?;
        let secs = self.task_timeout.as_secs();

        let mut cmd = Command::new(&self.program);
        cmd.arg("-i")
            .arg(workspace.inventory())
            .arg(workspace.playbook())
            .arg(format!("--timeout={secs}"));
        if let Some(vars) = workspace.vars() {
            cmd.arg("-e").arg(format!("@{}", vars.display()));
        }
        cmd.env("ANSIBLE_HOST_KEY_CHECKING", "False")
            .env("ANSIBLE_TIMEOUT", secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ExecutorError::Launch {
            program: self.program.clone(),
            source,
        })?;
        info!(pid = ?child.id(), "playbook runner started");

        let output = read_combined(child.stdout.take(), child.stderr.take()).await;
        let status = child.wait().await?;
        drop(workspace);

        let verdict = if status.success() {
            Ok(())
        } else {
            Err(match status.code() {
                Some(code) => format!("{} exited with status {code}", self.program),
                None => format!("{} was terminated by a signal", self.program),
            })
        };
        Ok((String::from_utf8_lossy(&output).into_owned(), verdict))
    }
}

/// Drain both pipes into one buffer in arrival order.
async fn read_combined<O, E>(mut stdout: Option<O>, mut stderr: Option<E>) -> Vec<u8>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut combined = Vec::new();
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            read = read_some(&mut stdout, &mut out_buf) => match read {
                Ok(0) | Err(_) => stdout = None,
                Ok(n) => combined.extend_from_slice(&out_buf[..n]),
            },
            read = read_some(&mut stderr, &mut err_buf) => match read {
                Ok(0) | Err(_) => stderr = None,
                Ok(n) => combined.extend_from_slice(&err_buf[..n]),
            },
        }
    }
    combined
}

async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// PlaybookExecutor
// ---------------------------------------------------------------------------

/// Per-target view of a [`PlaybookRunner`], used for canaries.
#[derive(Debug, Clone, Default)]
pub struct PlaybookExecutor {
    runner: PlaybookRunner,
}

impl PlaybookExecutor {
    pub fn new(runner: PlaybookRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl RemoteExecutor for PlaybookExecutor {
    async fn execute(&self, target: &Target, payload: &Payload) -> Outcome {
        match payload {
            Payload::Playbook(playbook) => self
                .runner
                .run(std::slice::from_ref(target), playbook)
                .await
                .retarget(target.id()),
            Payload::Command(_) => {
                Outcome::failed(target.id(), "", "playbook executor cannot run a command")
            }
        }
    }
}
