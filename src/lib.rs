// src/lib.rs

pub mod bridge;
pub mod cache;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod console;
pub mod control;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod key_manager;
pub mod logging;
pub mod pipeline;
pub mod rate_limit;
pub mod state;
pub mod walkers;

use crate::bridge::telegram::DEFAULT_TELEGRAM_API;
use crate::bridge::{Notifier, NullNotifier, TelegramBridge};
use crate::cache::TranslationCache;
use crate::config::{
    collect_api_keys, FileConfig, TelegramConfig, API_KEYS_ENV, API_KEY_FILE, TELEGRAM_CONFIG_FILE,
};
use crate::gateway::{GeminiClient, ModelClient, ModelGateway};
use crate::key_manager::KeyManager;
use crate::logging::SessionLog;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use url::Url;

pub use cli::Cli;
pub use config::Settings;
pub use driver::RunReport;
pub use error::{AppError, Result};
pub use state::RunContext;

/// Reads the optional settings file and merges the command line over it.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    Settings::resolve(cli, file)
}

/// A configured run: keys loaded, client bound, cache read.
pub struct Session {
    ctx: Arc<RunContext>,
    telegram: Option<TelegramBridge>,
    log: Option<SessionLog>,
}

impl Session {
    /// Builds every run-wide collaborator. Errors here are setup-fatal.
    #[instrument(skip_all, fields(file_type = %settings.file_type))]
    pub async fn start(cli: &Cli, settings: Settings, log: Option<SessionLog>) -> Result<Self> {
        let env_keys = std::env::var(API_KEYS_ENV).ok();
        let keys = collect_api_keys(&cli.api, env_keys.as_deref(), Path::new(API_KEY_FILE))?;
        if let Some(log) = &log {
            if let Err(e) = log.start(&settings, keys.len()) {
                warn!(error = %e, "Session banner could not be written");
            }
        }

        let telegram = if settings.telegram {
            let config = TelegramConfig::load(Path::new(TELEGRAM_CONFIG_FILE))?;
            let bridge = TelegramBridge::new(&config, Url::parse(DEFAULT_TELEGRAM_API)?)?;
            info!(chat_id = %config.chat_id, "Telegram bridge enabled");
            Some(bridge)
        } else {
            None
        };
        let notifier: Arc<dyn Notifier> = match &telegram {
            Some(bridge) => Arc::new(bridge.clone()),
            None => Arc::new(NullNotifier),
        };

        let client: Arc<dyn ModelClient> =
            Arc::new(GeminiClient::new(settings.api_base.clone(), settings.request_timeout)?);
        let keys = KeyManager::new(keys, &settings.model, Arc::clone(&client), Arc::clone(&notifier))?;

        let cache = if settings.persistent_cache {
            let cache = TranslationCache::persistent(&settings.cache_file);
            cache.load()?;
            cache
        } else {
            TranslationCache::in_memory()
        };

        let gateway = ModelGateway::new(client);
        let ctx = Arc::new(RunContext::new(settings, keys, cache, gateway, notifier));
        Ok(Self { ctx, telegram, log })
    }

    pub fn context(&self) -> Arc<RunContext> {
        Arc::clone(&self.ctx)
    }

    /// Processes the input tree, then saves the cache and reports the final
    /// stats whatever the outcome.
    pub async fn run(self) -> Result<RunReport> {
        let ctx = self.ctx;
        let settings = &ctx.settings;
        info!(
            input = %settings.input.display(),
            file_type = %settings.file_type,
            source = %settings.prompt.source_lang,
            target = %settings.prompt.target_lang,
            keys = ctx.keys.len(),
            "Translation run started"
        );
        ctx.notify(&format!(
            "🚀 *Translation started*\nFile type: `{}`\nLanguages: `{}` → `{}`\nAPI keys: `{}`",
            settings.file_type,
            settings.prompt.source_lang,
            settings.prompt.target_lang,
            ctx.keys.len()
        ));

        let poller = self
            .telegram
            .clone()
            .map(|bridge| tokio::spawn(bridge.serve(Arc::clone(&ctx))));
        if settings.interactive {
            if let Err(e) = console::spawn(Arc::clone(&ctx)) {
                warn!(error = %e, "Interactive console could not be started");
            }
        }

        let result = driver::run(&ctx).await;
        let outcome = match &result {
            Ok(report) if report.stopped_early => "stopped",
            Ok(_) => "completed",
            Err(_) => "aborted",
        };
        match &result {
            Ok(report) => info!(
                files_found = report.files_found,
                files_written = report.files_written,
                output = %report.output_root.display(),
                "Translation run finished"
            ),
            Err(e) => {
                error!(error = %e, "Translation run aborted");
                ctx.notify(&format!("🛑 *CRITICAL ERROR:* {e}\nThe run has been stopped."));
            }
        }

        if let Err(e) = ctx.cache.save() {
            warn!(error = %e, "Final cache save failed");
        }
        let stats = control::stats_reply(&ctx, "📊 Final stats");
        println!("{}", stats.to_terminal());

        if let Some(poller) = poller {
            poller.abort();
        }
        if let Some(bridge) = &self.telegram {
            bridge.shutdown(&stats.to_markup()).await;
        }
        if let Some(log) = &self.log {
            if let Err(e) = log.finish(outcome) {
                warn!(error = %e, "Session closing line could not be written");
            }
        }
        result
    }
}
