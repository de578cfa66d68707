// src/config.rs

use crate::cli::Cli;
use crate::error::{AppError, Result};
use crate::gateway::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Local file with one API key per line.
pub const API_KEY_FILE: &str = "api_key.txt";
/// Environment variable with comma separated API keys.
pub const API_KEYS_ENV: &str = "GEMINI_L10N_API_KEYS";
pub const TELEGRAM_CONFIG_FILE: &str = "telegram_config.json";
/// Placeholder every custom prompt has to contain.
pub const TEXT_PLACEHOLDER: &str = "{text_to_translate}";

const DEFAULT_INPUT: &str = "input";
const DEFAULT_DOMAIN: &str = "a generic video game";
const DEFAULT_SOURCE_LANG: &str = "English";
const DEFAULT_TARGET_LANG: &str = "Italian";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    Csv,
    Json,
    Po,
}

impl FileType {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Po => "po",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub translate_col: usize,
    pub output_col: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            translate_col: 3,
            output_col: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonOptions {
    pub keys: Vec<String>,
    pub match_full_path: bool,
}

/// Everything that feeds the prompt text and the cache fingerprints.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    /// Game or product name the texts belong to.
    pub domain: String,
    pub source_lang: String,
    pub target_lang: String,
    pub extra_context: Option<String>,
    pub custom_template: Option<String>,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            source_lang: DEFAULT_SOURCE_LANG.to_string(),
            target_lang: DEFAULT_TARGET_LANG.to_string(),
            extra_context: None,
            custom_template: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrapOptions {
    pub width: usize,
    pub newline: String,
}

/// Resolved, validated run configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub input: PathBuf,
    pub file_type: FileType,
    pub csv: CsvOptions,
    pub json: JsonOptions,
    pub prompt: PromptSettings,
    pub wrap: Option<WrapOptions>,
    pub translation_only_output: bool,
    pub enable_file_context: bool,
    pub full_context_sample: bool,
    pub max_entries: Option<usize>,
    pub rpm: Option<u32>,
    pub model: String,
    pub api_base: Url,
    pub request_timeout: Duration,
    pub enable_file_log: bool,
    pub interactive: bool,
    pub resume: bool,
    pub rotate_on_limit_or_error: bool,
    pub persistent_cache: bool,
    pub cache_file: PathBuf,
    pub telegram: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            file_type: FileType::Csv,
            csv: CsvOptions::default(),
            json: JsonOptions::default(),
            prompt: PromptSettings::default(),
            wrap: None,
            translation_only_output: false,
            enable_file_context: false,
            full_context_sample: false,
            max_entries: None,
            rpm: None,
            model: DEFAULT_MODEL.to_string(),
            // Constant URL, parsing cannot fail.
            api_base: Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL"),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            enable_file_log: false,
            interactive: false,
            resume: false,
            rotate_on_limit_or_error: false,
            persistent_cache: false,
            cache_file: PathBuf::from(crate::cache::CACHE_FILE_NAME),
            telegram: false,
        }
    }
}

/// Optional YAML settings file. Every field mirrors a command line option.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub input: Option<PathBuf>,
    pub file_type: Option<FileType>,
    pub delimiter: Option<String>,
    pub translate_col: Option<usize>,
    pub output_col: Option<usize>,
    pub json_keys: Option<Vec<String>>,
    pub match_full_json_path: Option<bool>,
    pub game_name: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub prompt_context: Option<String>,
    pub custom_prompt: Option<String>,
    pub translation_only_output: Option<bool>,
    pub rpm: Option<u32>,
    pub enable_file_context: Option<bool>,
    pub full_context_sample: Option<bool>,
    pub max_entries: Option<usize>,
    pub wrap_at: Option<usize>,
    pub newline_char: Option<String>,
    pub model_name: Option<String>,
    pub api_base: Option<String>,
    pub request_timeout: Option<u64>,
    pub enable_file_log: Option<bool>,
    pub interactive: Option<bool>,
    pub resume: Option<bool>,
    pub rotate_on_limit_or_error: Option<bool>,
    pub persistent_cache: Option<bool>,
    pub cache_file: Option<PathBuf>,
    pub telegram: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        info!(config.path = %path.display(), "Loading settings file");
        let content = fs::read_to_string(path).map_err(|e| AppError::ConfigParse {
            message: format!("cannot read '{}': {e}", path.display()),
        })?;
        serde_yaml::from_str(&content).map_err(|e| AppError::ConfigParse {
            message: format!("invalid settings file '{}': {e}", path.display()),
        })
    }
}

/// Resolves `\t`, `\n` and `\r\n` escapes typed on a shell.
fn unescape_control(value: &str) -> String {
    match value {
        "\\t" => "\t".to_string(),
        "\\n" => "\n".to_string(),
        "\\r\\n" => "\r\n".to_string(),
        other => other.to_string(),
    }
}

impl Settings {
    /// Merges CLI options over the settings file, then validates.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let defaults = Self::default();

        let delimiter = unescape_control(
            cli.delimiter
                .as_deref()
                .or(file.delimiter.as_deref())
                .unwrap_or(","),
        );
        let delimiter = match delimiter.as_bytes() {
            [byte] => *byte,
            _ => {
                return Err(AppError::config_validation(
                    format!("CSV delimiter must be a single byte, got '{delimiter}'"),
                    Some("delimiter"),
                ))
            }
        };

        let json_keys: Vec<String> = match (&cli.json_keys, file.json_keys) {
            (Some(keys), _) => keys.split(',').map(str::trim).filter(|k| !k.is_empty()).map(str::to_string).collect(),
            (None, Some(keys)) => keys.into_iter().map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect(),
            (None, None) => Vec::new(),
        };

        let api_base_raw = cli
            .api_base
            .clone()
            .or(file.api_base)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_base = Url::parse(&api_base_raw)?;

        let wrap = cli
            .wrap_at
            .or(file.wrap_at)
            .filter(|w| *w > 0)
            .map(|width| WrapOptions {
                width,
                newline: unescape_control(
                    cli.newline_char
                        .as_deref()
                        .or(file.newline_char.as_deref())
                        .unwrap_or("\\n"),
                ),
            });

        let settings = Self {
            input: cli.input.clone().or(file.input).unwrap_or(defaults.input),
            file_type: cli.file_type.or(file.file_type).unwrap_or_default(),
            csv: CsvOptions {
                delimiter,
                translate_col: cli.translate_col.or(file.translate_col).unwrap_or(defaults.csv.translate_col),
                output_col: cli.output_col.or(file.output_col).unwrap_or(defaults.csv.output_col),
            },
            json: JsonOptions {
                keys: json_keys,
                match_full_path: cli.match_full_json_path || file.match_full_json_path.unwrap_or(false),
            },
            prompt: PromptSettings {
                domain: cli.game_name.clone().or(file.game_name).unwrap_or(defaults.prompt.domain),
                source_lang: cli.source_lang.clone().or(file.source_lang).unwrap_or(defaults.prompt.source_lang),
                target_lang: cli.target_lang.clone().or(file.target_lang).unwrap_or(defaults.prompt.target_lang),
                extra_context: cli.prompt_context.clone().or(file.prompt_context),
                custom_template: cli.custom_prompt.clone().or(file.custom_prompt),
            },
            wrap,
            translation_only_output: cli.translation_only_output || file.translation_only_output.unwrap_or(false),
            enable_file_context: cli.enable_file_context || file.enable_file_context.unwrap_or(false),
            full_context_sample: cli.full_context_sample || file.full_context_sample.unwrap_or(false),
            max_entries: cli.max_entries.or(file.max_entries).filter(|m| *m > 0),
            rpm: cli.rpm.or(file.rpm).filter(|r| *r > 0),
            model: cli.model.clone().or(file.model_name).unwrap_or(defaults.model),
            api_base,
            request_timeout: Duration::from_secs(
                cli.request_timeout.or(file.request_timeout).unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            enable_file_log: cli.enable_file_log || file.enable_file_log.unwrap_or(false),
            interactive: cli.interactive || file.interactive.unwrap_or(false),
            resume: cli.resume || file.resume.unwrap_or(false),
            rotate_on_limit_or_error: cli.rotate_on_limit_or_error
                || file.rotate_on_limit_or_error.unwrap_or(false),
            persistent_cache: cli.persistent_cache || file.persistent_cache.unwrap_or(false),
            cache_file: cli.cache_file.clone().or(file.cache_file).unwrap_or(defaults.cache_file),
            telegram: cli.telegram || file.telegram.unwrap_or(false),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Setup checks that must pass before any work is attempted.
    pub fn validate(&self) -> Result<()> {
        debug!("Validating settings");
        if !self.input.is_dir() {
            return Err(AppError::InputNotFound {
                path: self.input.display().to_string(),
            });
        }
        if self.file_type == FileType::Json && self.json.keys.is_empty() {
            return Err(AppError::config_validation(
                "--json-keys is required with --file-type json",
                Some("json_keys"),
            ));
        }
        if let Some(template) = &self.prompt.custom_template {
            if !template.contains(TEXT_PLACEHOLDER) {
                return Err(AppError::config_validation(
                    format!("the custom prompt must contain '{TEXT_PLACEHOLDER}'"),
                    Some("custom_prompt"),
                ));
            }
        }
        if self.model.trim().is_empty() {
            return Err(AppError::config_validation("model name cannot be empty", Some("model_name")));
        }
        if !matches!(self.api_base.scheme(), "http" | "https") {
            return Err(AppError::config_validation(
                format!("unsupported API base scheme '{}'", self.api_base.scheme()),
                Some("api_base"),
            ));
        }
        if self.full_context_sample && !self.enable_file_context {
            warn!("--full-context-sample has no effect without --enable-file-context");
        }
        Ok(())
    }
}

/// Collects API keys from `--api`, the environment and the key file, in that
/// order, dropping blanks and duplicates.
pub fn collect_api_keys(
    cli_keys: &[String],
    env_keys: Option<&str>,
    key_file: &Path,
) -> Result<Vec<Secret<String>>> {
    let mut keys: Vec<String> = Vec::new();
    merge_keys(&mut keys, "--api", cli_keys.iter().map(String::as_str));
    if let Some(env_keys) = env_keys {
        merge_keys(&mut keys, API_KEYS_ENV, env_keys.split(','));
    }
    match fs::read_to_string(key_file) {
        Ok(content) => merge_keys(&mut keys, API_KEY_FILE, content.lines()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(AppError::io(format!("read {}", key_file.display()), &e)),
    }

    if keys.is_empty() {
        return Err(AppError::NoKeysConfigured);
    }
    info!(keys.total = keys.len(), "Unique API keys available");
    Ok(keys.into_iter().map(Secret::new).collect())
}

fn merge_keys<'a>(keys: &mut Vec<String>, source: &str, candidates: impl Iterator<Item = &'a str>) {
    let before = keys.len();
    for key in candidates.map(str::trim).filter(|k| !k.is_empty()) {
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    if keys.len() > before {
        info!(source, added = keys.len() - before, "API keys loaded");
    }
}

/// Credentials of the Telegram bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Secret<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub chat_id: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid chat_id: {other}"))),
    }
}

impl TelegramConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config_validation(
                format!("cannot read '{}': {e}", path.display()),
                Some("telegram"),
            )
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            AppError::config_validation(
                format!("invalid '{}': {e}", path.display()),
                Some("telegram"),
            )
        })?;
        if config.bot_token.expose_secret().trim().is_empty() || config.chat_id.trim().is_empty() {
            return Err(AppError::config_validation(
                format!("'{}' needs a bot_token and a chat_id", path.display()),
                Some("telegram"),
            ));
        }
        Ok(config)
    }
}
