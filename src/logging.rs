// src/logging.rs

use crate::config::Settings;
use crate::error::{AppError, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Session log written with `--enable-file-log`.
pub const LOG_FILE: &str = "log.txt";

/// Installs the global subscriber: a human-readable (or JSON) layer on stderr
/// plus an optional plain-text layer appending to `log_file`.
pub fn init(level: &str, json: bool, log_file: Option<&Path>) -> Result<Option<SessionLog>> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = if json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(io::stderr)
            .boxed()
    } else {
        fmt::layer().with_writer(io::stderr).boxed()
    };

    let (file_layer, session) = match log_file {
        Some(path) => {
            let file = open_append(path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed();
            (Some(layer), Some(SessionLog { path: path.to_path_buf() }))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::internal(format!("logging already initialised: {e}")))?;
    Ok(session)
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AppError::io(format!("open {}", path.display()), &e))
}

/// Banner and closing line around the records of one run in the log file.
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the session banner with a configuration summary. API keys are
    /// only ever counted.
    pub fn start(&self, settings: &Settings, key_count: usize) -> Result<()> {
        let mut out = String::new();
        out.push_str(&format!(
            "\n{rule}\nSession started {}\n{rule}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            rule = "=".repeat(60)
        ));
        for (label, value) in settings_summary(settings, key_count) {
            out.push_str(&format!("  {label}: {value}\n"));
        }
        self.append(&out)
    }

    pub fn finish(&self, outcome: &str) -> Result<()> {
        self.append(&format!(
            "Session ended {} ({outcome})\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ))
    }

    fn append(&self, text: &str) -> Result<()> {
        open_append(&self.path)?
            .write_all(text.as_bytes())
            .map_err(|e| AppError::io(format!("write {}", self.path.display()), &e))
    }
}

/// Label/value pairs describing a run, safe to log.
pub fn settings_summary(settings: &Settings, key_count: usize) -> Vec<(&'static str, String)> {
    let on_off = |flag: bool| String::from(if flag { "on" } else { "off" });
    vec![
        ("input", settings.input.display().to_string()),
        ("file type", settings.file_type.to_string()),
        (
            "languages",
            format!("{} -> {}", settings.prompt.source_lang, settings.prompt.target_lang),
        ),
        ("domain", settings.prompt.domain.clone()),
        ("model", settings.model.clone()),
        ("api keys", key_count.to_string()),
        ("rpm", settings.rpm.map_or_else(|| "unlimited".to_string(), |r| r.to_string())),
        (
            "max entries",
            settings.max_entries.map_or_else(|| "unlimited".to_string(), |m| m.to_string()),
        ),
        ("file context", on_off(settings.enable_file_context)),
        ("persistent cache", on_off(settings.persistent_cache)),
        ("resume", on_off(settings.resume)),
        ("rotate on limit or error", on_off(settings.rotate_on_limit_or_error)),
        ("telegram", on_off(settings.telegram)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_banner_and_closing_line() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog {
            path: dir.path().join(LOG_FILE),
        };
        let settings = Settings::default();
        log.start(&settings, 3).unwrap();
        log.finish("completed").unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("Session started"));
        assert!(content.contains("  api keys: 3\n"));
        assert!(content.contains("  rpm: unlimited\n"));
        assert!(content.trim_end().ends_with("(completed)"));
    }

    #[test]
    fn test_summary_never_contains_keys() {
        let summary = settings_summary(&Settings::default(), 2);
        assert!(summary.iter().all(|(_, value)| !value.contains("AIza")));
        assert_eq!(summary.iter().find(|(l, _)| *l == "api keys").unwrap().1, "2");
    }
}
