use crate::config::FileType;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Default, Clone)]
#[command(
    name = "gemini-l10n",
    version,
    about = "Batch translator for CSV, JSON and PO localization files powered by Google Gemini",
    long_about = "Walks a directory of localization files and translates every human-readable string through the Gemini API, with multi-key rotation, RPM limiting, a persistent translation cache, resumable CSV output and interactive runtime control."
)]
pub struct Cli {
    /// Optional YAML settings file; its values fill in options not given on the command line
    #[arg(short, long, value_name = "FILE", env = "GEMINI_L10N_CONFIG")]
    pub config: Option<PathBuf>,

    // --- API and model ---
    /// One or more Gemini API keys, comma separated
    #[arg(long, value_delimiter = ',', value_name = "KEYS")]
    pub api: Vec<String>,

    /// Gemini model name [default: gemini-2.5-flash]
    #[arg(long = "model-name", env = "GEMINI_L10N_MODEL")]
    pub model: Option<String>,

    /// Base URL of the Gemini REST API
    #[arg(long, env = "GEMINI_L10N_API_BASE")]
    pub api_base: Option<String>,

    /// Per-request timeout in seconds [default: 120]
    #[arg(long, value_name = "SECS")]
    pub request_timeout: Option<u64>,

    // --- Files and format ---
    /// Base directory with the files to translate [default: input]
    #[arg(long, env = "GEMINI_L10N_INPUT")]
    pub input: Option<PathBuf>,

    /// Kind of files to process [default: csv]
    #[arg(long, value_enum)]
    pub file_type: Option<FileType>,

    /// [CSV] Field delimiter, `\t` for tabs [default: ,]
    #[arg(long)]
    pub delimiter: Option<String>,

    /// [CSV] 0-based column holding the source text [default: 3]
    #[arg(long)]
    pub translate_col: Option<usize>,

    /// [CSV] 0-based column receiving the translation [default: 3]
    #[arg(long)]
    pub output_col: Option<usize>,

    /// [JSON, required] Comma separated keys to translate, dotted paths allowed
    #[arg(long)]
    pub json_keys: Option<String>,

    /// [JSON] Match the full dotted key path instead of the last key name
    #[arg(long)]
    pub match_full_json_path: bool,

    // --- Translation ---
    /// Name of the game or product, used as translation domain
    #[arg(long)]
    pub game_name: Option<String>,

    /// Source language [default: English]
    #[arg(long)]
    pub source_lang: Option<String>,

    /// Target language [default: Italian]
    #[arg(long)]
    pub target_lang: Option<String>,

    /// Extra instruction appended to every prompt
    #[arg(long)]
    pub prompt_context: Option<String>,

    /// Custom prompt template; must contain `{text_to_translate}`
    #[arg(long)]
    pub custom_prompt: Option<String>,

    /// Write only the translated texts, one per line
    #[arg(long)]
    pub translation_only_output: bool,

    /// Maximum API requests per minute (0 disables the limit)
    #[arg(long, env = "GEMINI_L10N_RPM")]
    pub rpm: Option<u32>,

    /// Generate a per-file context from a sample of its texts
    #[arg(long)]
    pub enable_file_context: bool,

    /// Use every translatable text of the file as context sample
    #[arg(long, requires = "enable_file_context")]
    pub full_context_sample: bool,

    /// Skip files with more entries to translate than this
    #[arg(long)]
    pub max_entries: Option<usize>,

    // --- Word wrapping ---
    /// Wrap translated lines at this width
    #[arg(long)]
    pub wrap_at: Option<usize>,

    /// Line break inserted when wrapping, `\n` or `\r\n` escapes accepted [default: \n]
    #[arg(long)]
    pub newline_char: Option<String>,

    // --- Utilities ---
    /// Append a session log to log.txt
    #[arg(long)]
    pub enable_file_log: bool,

    /// Accept runtime commands on stdin
    #[arg(long)]
    pub interactive: bool,

    /// Resume CSV files from partially written output
    #[arg(long)]
    pub resume: bool,

    /// Rotate to the next key on RPM limit or API error instead of waiting or retrying
    #[arg(long)]
    pub rotate_on_limit_or_error: bool,

    /// Keep the translation cache on disk between runs
    #[arg(long)]
    pub persistent_cache: bool,

    /// Cache file path [default: translation_cache.json]
    #[arg(long, value_name = "FILE")]
    pub cache_file: Option<PathBuf>,

    /// Enable notifications and commands through a Telegram bot (telegram_config.json)
    #[arg(long)]
    pub telegram: bool,

    // --- Logging ---
    /// Log level filter
    #[arg(short, long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "GEMINI_L10N_JSON_LOGS")]
    pub json_logs: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_keys_and_flags() {
        let cli = Cli::try_parse_from([
            "gemini-l10n",
            "--api",
            "k1,k2",
            "--file-type",
            "po",
            "--rpm",
            "10",
            "--interactive",
        ])
        .unwrap();
        assert_eq!(cli.api, vec!["k1", "k2"]);
        assert_eq!(cli.file_type, Some(FileType::Po));
        assert_eq!(cli.rpm, Some(10));
        assert!(cli.interactive);
    }

    #[test]
    fn test_full_context_sample_requires_file_context() {
        let result = Cli::try_parse_from(["gemini-l10n", "--full-context-sample"]);
        assert!(result.is_err());
    }
}
