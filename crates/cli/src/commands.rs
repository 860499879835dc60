use std::path::Path;
use std::sync::Arc;

use common::{OwnerKind, TargetSource};
use executor::{
    check_all, Campaign, ConnectionCheck, Dispatcher, ExecutorError, RemoteExecutor, SshExecutor,
};
use ledger::Ledger;
use ssh::SshConfig;
use terminal::{SshOpener, TerminalService};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::args::{
    CanaryArgs, CheckArgs, Command, ContinueArgs, ExecArgs, LogsArgs, OutputFormat, PlaybookArgs,
    ServeArgs, SessionsArgs,
};
use crate::config::{Config, Inventory, ServeSection};
use crate::error::{CliError, Result};
use crate::output;

/// Everything a subcommand needs, built once from the config file.
pub struct App {
    inventory: Inventory,
    campaign: Campaign,
    checker: Arc<ConnectionCheck>,
    ssh: SshConfig,
    serve: ServeSection,
    format: OutputFormat,
}

impl App {
    pub fn from_config(config: &Config, database: Option<&Path>, format: OutputFormat) -> Result<Self> {
        let ledger_path = config.ledger_path(database);
        let ledger = Ledger::open(&ledger_path)?;
        info!(path = %ledger_path.display(), "ledger opened");

        let ssh = config.ssh.to_ssh_config();
        let dispatcher = Dispatcher::new(SshExecutor::new(ssh), config.playbook.to_runner());
        Ok(Self::with_executor(config, Arc::new(dispatcher), ledger, format))
    }

    fn with_executor(
        config: &Config,
        executor: Arc<dyn RemoteExecutor>,
        ledger: Ledger,
        format: OutputFormat,
    ) -> Self {
        Self {
            inventory: config.inventory(),
            campaign: Campaign::new(executor, config.playbook.to_runner(), ledger),
            checker: Arc::new(ConnectionCheck::new(config.ssh.to_ssh_config())),
            ssh: config.ssh.to_ssh_config(),
            serve: config.serve.clone(),
            format,
        }
    }

    /// Run one subcommand and return what should go to stdout.
    pub async fn run(self, command: Command) -> Result<String> {
        match command {
            Command::Exec(args) => self.exec(args).await,
            Command::Canary(args) => self.canary(args).await,
            Command::Continue(args) => self.continue_rollout(args).await,
            Command::Playbook(args) => self.playbook(args).await,
            Command::Sessions(args) => self.sessions(args),
            Command::Logs(args) => self.logs(args),
            Command::Serve(args) => self.serve(args).await,
            Command::Check(args) => self.check(args).await,
        }
    }

    #[instrument(skip_all, fields(group = %args.group))]
    async fn exec(&self, args: ExecArgs) -> Result<String> {
        let targets = self.inventory.resolve(&args.group)?;
        let loaded = args.source.load(args.name.as_deref())?;
        let owner = self.campaign.ledger().register_owner(loaded.kind(), &loaded.owner)?;
        let report = self.campaign.run(&owner, &targets, &loaded.payload).await?;
        output::run_report(&report, self.format)
    }

    #[instrument(skip_all, fields(group = %args.group))]
    async fn canary(&self, args: CanaryArgs) -> Result<String> {
        let targets = self.inventory.resolve(&args.group)?;
        let loaded = args.source.load(args.name.as_deref())?;
        let owner = self.campaign.ledger().register_owner(loaded.kind(), &loaded.owner)?;
        let report = self.campaign.start_canary(&owner, &targets, &loaded.payload).await?;
        output::canary_report(&report, self.format)
    }

    #[instrument(skip_all, fields(group = %args.group, session = %args.session))]
    async fn continue_rollout(&self, args: ContinueArgs) -> Result<String> {
        let loaded = args.source.load(args.name.as_deref())?;
        let owner = self.campaign.ledger().owner(loaded.kind(), &loaded.owner)?;
        let remaining = self.inventory.resolve_addresses(&args.group, &args.remaining)?;
        let report = self
            .campaign
            .continue_rollout(&owner, &args.session, &remaining, &loaded.payload)
            .await?;
        output::run_report(&report, self.format)
    }

    #[instrument(skip_all, fields(group = %args.group))]
    async fn playbook(&self, args: PlaybookArgs) -> Result<String> {
        let targets = self.inventory.resolve(&args.group)?;
        let loaded = args.load()?;
        let owner = self.campaign.ledger().register_owner(loaded.kind(), &loaded.owner)?;
        let report = self.campaign.run(&owner, &targets, &loaded.payload).await?;
        output::run_report(&report, self.format)
    }

    #[instrument(skip_all, fields(group = %args.group))]
    async fn check(&self, args: CheckArgs) -> Result<String> {
        let targets = match &args.host {
            Some(host) => self
                .inventory
                .resolve_addresses(&args.group, std::slice::from_ref(host))?,
            None => self.inventory.resolve(&args.group)?,
        };
        if targets.is_empty() {
            return Err(ExecutorError::NoTargets.into());
        }
        let outcomes = check_all(Arc::clone(&self.checker), &targets).await;
        output::check_report(&outcomes, self.format)
    }

    fn sessions(&self, args: SessionsArgs) -> Result<String> {
        let ledger = self.campaign.ledger();
        let owner = ledger.owner(owner_kind(args.playbook), &args.name)?;
        output::sessions(&ledger.list_sessions(&owner)?, self.format)
    }

    fn logs(&self, args: LogsArgs) -> Result<String> {
        let ledger = self.campaign.ledger();
        let owner = ledger.owner(owner_kind(args.playbook), &args.name)?;
        output::logs(&ledger.fetch_logs(&owner, &args.session)?, self.format)
    }

    async fn serve(self, args: ServeArgs) -> Result<String> {
        let addr = args.listen.unwrap_or(self.serve.listen);
        let inventory: Arc<dyn TargetSource> = Arc::new(self.inventory);
        let router = TerminalService::new(Arc::new(SshOpener::new(self.ssh)), inventory).router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CliError::Serve { addr, source })?;
        info!(%addr, "terminal server listening");
        eprintln!("serving terminals on ws://{addr}/terminal/{{group}}/{{address}}");

        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown requested");
            })
            .await
            .map_err(|source| CliError::Serve { addr, source })?;
        Ok(String::new())
    }
}

fn owner_kind(playbook: bool) -> OwnerKind {
    if playbook {
        OwnerKind::Playbook
    } else {
        OwnerKind::Script
    }
}
