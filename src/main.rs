// src/main.rs

use gemini_l10n::logging::{self, LOG_FILE};
use gemini_l10n::{load_settings, AppError, Cli, RunContext, Session};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, warn};

/// First Ctrl+C: stop after saving the current file. Second: exit at once.
async fn watch_interrupts(ctx: Arc<RunContext>) {
    if signal::ctrl_c().await.is_err() {
        warn!("Ctrl+C handler could not be installed");
        return;
    }
    warn!(signal = "Ctrl+C", "Interrupt received. Saving progress and stopping, press Ctrl+C again to exit immediately");
    ctx.request_stop();
    ctx.flags().skip_file = true;
    ctx.pause.resume();

    if signal::ctrl_c().await.is_ok() {
        error!(signal = "Ctrl+C", "Second interrupt, exiting now");
        if let Err(e) = ctx.cache.save() {
            error!(error = %e, "Cache could not be saved before exiting");
        }
        std::process::exit(130);
    }
}

fn fail(err: &AppError) -> ExitCode {
    err.log();
    eprintln!("🛑 {err}");
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => return fail(&e),
    };

    let log_file = settings.enable_file_log.then(|| Path::new(LOG_FILE));
    let session_log = match logging::init(&cli.log_level, cli.json_logs, log_file) {
        Ok(session_log) => session_log,
        Err(e) => {
            eprintln!("⚠️ {e}");
            None
        }
    };

    let session = match Session::start(&cli, settings, session_log).await {
        Ok(session) => session,
        Err(e) => return fail(&e),
    };
    tokio::spawn(watch_interrupts(session.context()));

    match session.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}
