mod args;
mod commands;
mod config;
mod error;
mod logging;
mod output;

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};

use args::Cli;
use commands::App;
use config::Config;
use error::Result;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(cli.verbose);
    let format = cli.output;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "command failed");
            if let Some(outcomes) = e.unrecorded_outcomes() {
                match output::outcomes(outcomes, format) {
                    Ok(text) => print(&text),
                    Err(render) => error!(%render, "failed to print unrecorded outcomes"),
                }
            }
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    debug!(path = %config_path.display(), "loading config");
    let config = Config::load(&config_path)?;

    let app = App::from_config(&config, cli.database.as_deref(), cli.output)?;
    let text = app.run(cli.command).await?;
    print(&text);
    Ok(())
}

fn print(text: &str) {
    if text.is_empty() {
        return;
    }
    let mut stdout = std::io::stdout().lock();
    // Ignore EPIPE from `| head`.
    let _ = stdout.write_all(text.as_bytes());
    let _ = stdout.flush();
}
