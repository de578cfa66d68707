// tests/cli_tests.rs

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gemini-l10n").unwrap();
    cmd.current_dir(workdir.path())
        .env_remove("GEMINI_L10N_API_KEYS")
        .env_remove("GEMINI_L10N_INPUT")
        .env_remove("GEMINI_L10N_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_the_main_options() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--file-type"))
        .stdout(predicate::str::contains("--persistent-cache"));
}

#[test]
fn test_missing_input_directory_exits_with_1() {
    let dir = TempDir::new().unwrap();
    cmd(&dir)
        .args(["--input", "does-not-exist", "--api", "key-aaaa"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Input directory not found"));
}

#[test]
fn test_no_keys_exits_with_1() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("input")).unwrap();
    cmd(&dir)
        .args(["--input", "input"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No API keys found"));
}

#[test]
fn test_json_mode_requires_keys_option() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("input")).unwrap();
    cmd(&dir)
        .args(["--input", "input", "--file-type", "json", "--api", "key-aaaa"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--json-keys"));
}

#[test]
fn test_invalid_settings_file_exits_with_1() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("settings.yaml"), "unknown_option: true\n").unwrap();
    cmd(&dir)
        .args(["--config", "settings.yaml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("settings file"));
}

#[test]
fn test_empty_input_tree_completes() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("input")).unwrap();
    cmd(&dir)
        .args(["--input", "input", "--api", "key-aaaa"])
        .assert()
        .success();
    assert!(dir.path().join("translated").is_dir());
}
