// tests/control_tests.rs

mod common;

use common::{ScriptedClient, TestContextBuilder};
use gemini_l10n::cache::TranslationCache;
use gemini_l10n::control::{self, Block};
use gemini_l10n::pipeline;
use std::sync::Arc;
use tempfile::TempDir;

fn two_key_context() -> (gemini_l10n::RunContext, Arc<gemini_l10n::bridge::MemoryNotifier>) {
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let builder = TestContextBuilder::new(client).with_keys(&["key-one-aaaa", "key-two-bbbb"]);
    let notifier = builder.notifier();
    (builder.build(), notifier)
}

#[test]
fn test_unknown_command_gets_a_hint() {
    let (ctx, _) = two_key_context();
    let reply = control::dispatch(&ctx, "dance", true);
    assert!(reply.starts_with("⚠️"));
}

#[test]
fn test_pause_resume_and_stop_flags() {
    let (ctx, _) = two_key_context();

    control::dispatch(&ctx, "pause", true);
    assert!(ctx.pause.is_paused());
    control::dispatch(&ctx, "resume", true);
    assert!(!ctx.pause.is_paused());

    control::dispatch(&ctx, "skip file", true);
    control::dispatch(&ctx, "skip api", true);
    control::dispatch(&ctx, "stop", true);
    let flags = ctx.flags();
    assert!(flags.skip_file);
    assert!(flags.skip_api);
    assert!(flags.stop_requested);
}

#[test]
fn test_terminal_pause_includes_stats() {
    let (ctx, _) = two_key_context();
    let reply = control::execute(&ctx, "pause", false);
    assert!(reply.blocks().iter().any(|b| matches!(b, Block::Keys(_))));
}

#[test]
fn test_key_management_commands() {
    let (ctx, _) = two_key_context();

    let added = control::dispatch(&ctx, "add api key-three-cccc", true);
    assert!(added.contains("...cccc"));
    assert_eq!(ctx.keys.len(), 3);
    assert!(control::dispatch(&ctx, "add api key-three-cccc", true).contains("already"));

    assert!(control::dispatch(&ctx, "blacklist 7", true).contains("out of range"));
    assert!(control::dispatch(&ctx, "blacklist 0", true).contains("blacklisted"));
    assert!(ctx.keys.is_blacklisted(0));
    assert_eq!(ctx.keys.active_index(), 1);

    let list = control::dispatch(&ctx, "list keys", true);
    assert!(list.contains("❌ BLACKLISTED"));
    assert!(list.contains("✅ ACTIVE"));

    assert!(control::dispatch(&ctx, "clear blacklist", true).contains('1'));
    assert!(!ctx.keys.is_blacklisted(0));

    control::dispatch(&ctx, "remove key 2", true);
    assert_eq!(ctx.keys.len(), 2);
}

#[test]
fn test_blacklisting_every_key_is_reported_as_critical() {
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let builder = TestContextBuilder::new(client);
    let notifier = builder.notifier();
    let ctx = builder.build();

    let reply = control::dispatch(&ctx, "exhausted", true);

    assert!(reply.contains("CRITICAL"));
    assert!(notifier.messages().iter().any(|m| m.contains("CRITICAL")));
    assert_eq!(ctx.keys.usable(), 0);
}

#[test]
fn test_runtime_limits() {
    let (ctx, _) = two_key_context();

    control::dispatch(&ctx, "set rpm 30", true);
    assert_eq!(ctx.limiter.limit(), Some(30));
    assert!(control::dispatch(&ctx, "show rpm", true).contains("30/min"));
    control::dispatch(&ctx, "set rpm 0", true);
    assert_eq!(ctx.limiter.limit(), None);

    control::dispatch(&ctx, "set max_entries 100", true);
    assert_eq!(ctx.flags().max_entries, Some(100));
    assert!(control::dispatch(&ctx, "set max_entries -1", true).starts_with("⚠️"));
    assert_eq!(ctx.flags().max_entries, Some(100));

    control::dispatch(&ctx, "set model gemini-2.5-pro", true);
    assert_eq!(ctx.keys.model(), "gemini-2.5-pro");
}

#[tokio::test]
async fn test_stats_and_prompt_reflect_the_run() {
    let (ctx, _) = two_key_context();
    pipeline::translate(&ctx, "Hello", "unit", None).await.unwrap();
    pipeline::translate(&ctx, "Hello", "unit", None).await.unwrap();

    let stats = control::dispatch(&ctx, "stats", true);
    assert!(stats.contains("*💾 Cache hits:* `1`"));
    assert!(stats.contains("*📞 Total API calls:* `1`"));

    let prompt = control::dispatch(&ctx, "prompt", true);
    assert!(prompt.contains("Hello"));
    assert!(control::dispatch(&ctx, "show file_progress", true).contains("No file in progress"));
}

#[test]
fn test_cache_commands() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    let client = Arc::new(ScriptedClient::new("Ciao"));
    let ctx = TestContextBuilder::new(client)
        .with_cache(TranslationCache::persistent(&path))
        .build();
    ctx.cache.put("fingerprint", "value");

    assert!(control::dispatch(&ctx, "save cache", true).contains("cache saved"));
    assert!(path.exists());

    assert!(control::dispatch(&ctx, "clear cache", true).contains("1 entries removed"));
    assert!(ctx.cache.is_empty());

    assert!(control::dispatch(&ctx, "reload cache", true).contains("0 -> 1"));
    assert_eq!(ctx.cache.get("fingerprint").as_deref(), Some("value"));
}

#[test]
fn test_cache_commands_without_persistence() {
    let (ctx, _) = two_key_context();
    assert!(control::dispatch(&ctx, "save cache", true).contains("disabled"));
    assert!(control::dispatch(&ctx, "reload cache", true).contains("disabled"));
}

#[test]
fn test_log_requires_file_logging() {
    let (ctx, _) = two_key_context();
    assert!(control::dispatch(&ctx, "log checkpoint reached", true).contains("disabled"));
}

#[test]
fn test_console_reads_until_exit() {
    let (ctx, _) = two_key_context();
    let input = b"set rpm 12\n\nexit\nstop\n".as_slice();
    let mut output = Vec::new();

    gemini_l10n::console::serve(&ctx, input, &mut output);

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains("12"));
    assert!(printed.contains("Closing the interactive console"));
    // Lines after `exit` are never dispatched.
    assert!(!ctx.stop_requested());
    assert_eq!(ctx.limiter.limit(), Some(12));
}
