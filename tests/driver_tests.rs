// tests/driver_tests.rs

mod common;

use common::{settings, ScriptedClient, TestContextBuilder};
use gemini_l10n::cache::TranslationCache;
use gemini_l10n::config::{FileType, JsonOptions};
use gemini_l10n::driver;
use gemini_l10n::error::{AppError, ModelError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// `<tmp>/input` holding `files`; returns the input directory.
fn input_tree(dir: &TempDir, files: &[(&str, &str)]) -> PathBuf {
    let input = dir.path().join("input");
    for (name, content) in files {
        let path = input.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    fs::create_dir_all(&input).unwrap();
    input
}

fn translated(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().canonicalize().unwrap().join("translated").join(name)
}

fn csv_settings(input: &Path) -> gemini_l10n::Settings {
    let mut settings = settings(input);
    settings.file_type = FileType::Csv;
    settings.csv.translate_col = 1;
    settings.csv.output_col = 2;
    settings
}

#[tokio::test]
async fn test_csv_tree_is_translated_and_mirrored() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(
        &dir,
        &[
            ("menu.csv", "id,text\n1,Hello\n2,42\n"),
            ("levels/intro.csv", "id,text\n1,Welcome\n"),
        ],
    );
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let builder = TestContextBuilder::new(client.clone()).with_settings(csv_settings(&input));
    let notifier = builder.notifier();
    let ctx = builder.build();

    let report = driver::run(&ctx).await.unwrap();

    assert_eq!(report.files_found, 2);
    assert_eq!(report.files_written, 2);
    assert!(!report.stopped_early);
    let menu = fs::read_to_string(translated(&dir, "menu.csv")).unwrap();
    assert_eq!(menu, "id,text\r\n1,Hello,Ciao\r\n2,42\r\n");
    assert!(translated(&dir, "levels/intro.csv").exists());

    assert_eq!(ctx.counters.files_completed(), 2);
    assert_eq!(ctx.counters.entries_translated(), 2);
    // Same response text but different sources: one call per unit.
    assert_eq!(client.calls(), 2);
    assert_eq!(
        notifier
            .messages()
            .iter()
            .filter(|m| m.starts_with("✅ *File completed!*"))
            .count(),
        2
    );
    assert_eq!(ctx.flags().progress.total, 0);
}

#[tokio::test]
async fn test_file_over_max_entries_is_skipped_without_output() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(&dir, &[("big.csv", "id,text\n1,One line\n2,Two lines\n3,Three lines\n")]);
    let mut settings = csv_settings(&input);
    settings.max_entries = Some(2);
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let ctx = TestContextBuilder::new(client.clone()).with_settings(settings).build();

    let report = driver::run(&ctx).await.unwrap();

    assert_eq!(report.files_written, 0);
    assert!(!translated(&dir, "big.csv").exists());
    assert_eq!(client.calls(), 0);
    assert_eq!(ctx.counters.files_completed(), 0);
}

#[tokio::test]
async fn test_json_translation_only_output() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(
        &dir,
        &[("dialog.json", r#"{"lines": [{"text": "Hi there"}, {"text": "Bye now"}], "id": "x"}"#)],
    );
    let mut settings = settings(&input);
    settings.file_type = FileType::Json;
    settings.json = JsonOptions {
        keys: vec!["text".to_string()],
        match_full_path: false,
    };
    settings.translation_only_output = true;
    let client = Arc::new(ScriptedClient::new("").with_script(vec![Ok("Ciao".into()), Ok("Addio".into())]));
    let ctx = TestContextBuilder::new(client).with_settings(settings).build();

    driver::run(&ctx).await.unwrap();

    let output = fs::read_to_string(translated(&dir, "dialog_translations.txt")).unwrap();
    assert_eq!(output, "Ciao\nAddio\n");
    assert!(!translated(&dir, "dialog.json").exists());
}

#[tokio::test]
async fn test_po_file_context_reaches_the_prompt() {
    let dir = TempDir::new().unwrap();
    let catalog = "msgid \"\"\nmsgstr \"\"\n\"Language: it\\n\"\n\nmsgctxt \"menu\"\nmsgid \"Start game\"\nmsgstr \"\"\n";
    let input = input_tree(&dir, &[("ui.po", catalog)]);
    let mut settings = settings(&input);
    settings.file_type = FileType::Po;
    settings.enable_file_context = true;
    let client = Arc::new(
        ScriptedClient::new("Inizia partita").with_script(vec![Ok("Main menu of a fantasy game.".into())]),
    );
    let ctx = TestContextBuilder::new(client.clone()).with_settings(settings).build();

    driver::run(&ctx).await.unwrap();

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Start game"));
    assert!(prompts[1].contains("General context: Main menu of a fantasy game. - Entry context: menu"));
    let output = fs::read_to_string(translated(&dir, "ui.po")).unwrap();
    assert!(output.contains("msgstr \"Inizia partita\""));
}

#[tokio::test]
async fn test_cached_file_skips_context_generation() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(&dir, &[("a.csv", "id,text\n1,Hello\n")]);
    let mut settings = csv_settings(&input);
    settings.enable_file_context = true;
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let cache = TranslationCache::in_memory();
    cache.put(
        gemini_l10n::classifier::translation_fingerprint("Hello", "English", "Italian", &settings.prompt.domain, None),
        "Salve",
    );
    let ctx = TestContextBuilder::new(client.clone())
        .with_settings(settings)
        .with_cache(cache)
        .build();

    driver::run(&ctx).await.unwrap();

    assert_eq!(client.calls(), 0);
    assert_eq!(ctx.counters.cache_hits(), 1);
    let output = fs::read_to_string(translated(&dir, "a.csv")).unwrap();
    assert!(output.contains("Salve"));
}

#[tokio::test]
async fn test_stop_request_ends_the_run_before_the_next_file() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(&dir, &[("a.csv", "id,text\n1,Hello\n")]);
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let ctx = TestContextBuilder::new(client.clone()).with_settings(csv_settings(&input)).build();
    ctx.request_stop();

    let report = driver::run(&ctx).await.unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.files_written, 0);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_pending_skip_skips_exactly_one_file() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(
        &dir,
        &[("a.csv", "id,text\n1,Hello\n"), ("b.csv", "id,text\n1,Goodbye\n")],
    );
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let ctx = TestContextBuilder::new(client.clone()).with_settings(csv_settings(&input)).build();
    ctx.flags().skip_file = true;

    let report = driver::run(&ctx).await.unwrap();

    assert_eq!(report.files_written, 1);
    assert!(!translated(&dir, "a.csv").exists());
    assert!(translated(&dir, "b.csv").exists());
    assert!(!ctx.skip_file_requested());
}

#[tokio::test]
async fn test_unparsable_file_does_not_stop_the_run() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(
        &dir,
        &[("a.json", "{ broken"), ("b.json", r#"{"text": "Hello"}"#)],
    );
    let mut settings = settings(&input);
    settings.file_type = FileType::Json;
    settings.json.keys = vec!["text".to_string()];
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let ctx = TestContextBuilder::new(client).with_settings(settings).build();

    let report = driver::run(&ctx).await.unwrap();

    assert_eq!(report.files_written, 1);
    assert!(translated(&dir, "b.json").exists());
}

#[tokio::test]
async fn test_exhausted_keys_abort_but_keep_partial_output() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(&dir, &[("a.csv", "id,text\n1,Hello\n2,Goodbye\n")]);
    // The only key is rejected on the first call.
    let client = Arc::new(ScriptedClient::new("Ciao").reject_key("key-one-aaaa"));
    let ctx = TestContextBuilder::new(client).with_settings(csv_settings(&input)).build();

    let err = driver::run(&ctx).await.unwrap_err();

    assert!(matches!(err, AppError::KeysExhausted));
    assert!(translated(&dir, "a.csv").exists());
    assert_eq!(ctx.counters.files_completed(), 0);
}

#[tokio::test]
async fn test_failed_units_keep_the_source_text() {
    let dir = TempDir::new().unwrap();
    let input = input_tree(&dir, &[("a.csv", "id,text\n1,Hello\n")]);
    let client = Arc::new(
        ScriptedClient::new("Ciao").with_script(vec![Err(ModelError::Internal("500".into()))]),
    );
    let ctx = TestContextBuilder::new(client).with_settings(csv_settings(&input)).build();

    driver::run(&ctx).await.unwrap();

    let output = fs::read_to_string(translated(&dir, "a.csv")).unwrap();
    assert_eq!(output, "id,text\r\n1,Hello,Hello\r\n");
    assert_eq!(ctx.counters.entries_translated(), 1);
}
