// src/control/mod.rs

//! Runtime control plane shared by the local console and the chat bridge.

pub mod command;
pub mod reply;

use crate::cache::SaveOutcome;
use crate::key_manager::KeyChange;
use crate::state::RunContext;
use std::time::Duration;
use tracing::{info, warn};

pub use command::{verb_of, Command, ParseError};
pub use reply::{strip_markup, Block, Reply};

const HELP: &[(&str, &[(&str, &str)])] = &[
    (
        "Run control",
        &[
            ("stop", "Stop after the current file."),
            ("pause", "Pause processing."),
            ("resume", "Resume processing."),
        ],
    ),
    (
        "Skipping and rotation",
        &[
            ("skip file", "Skip the current file."),
            ("skip api", "Force a rotation of the API key."),
            ("exhausted", "Blacklist the current key and rotate."),
        ],
    ),
    (
        "API keys",
        &[
            ("list keys", "Show the API keys."),
            ("add api <key>", "Add a new API key."),
            ("remove key <index>", "Remove an API key by index."),
            ("blacklist <index>", "Blacklist an API key."),
            ("clear blacklist", "Clear the key blacklist."),
        ],
    ),
    (
        "Stats and info",
        &[
            ("stats", "Show the full run statistics."),
            ("show rpm", "Show the RPM statistics."),
            ("show file_progress", "Show the progress of the current file."),
            ("context", "Show the context generated for the file."),
            ("prompt", "Show the last prompt sent to the model."),
            ("log <message>", "Write a note to the log file."),
        ],
    ),
    (
        "Configuration",
        &[
            ("set rpm <n>", "Set the requests-per-minute limit (0 disables it)."),
            ("set model <name>", "Switch the Gemini model."),
            ("set max_entries <n>", "Set the maximum entries per file (0 disables it)."),
        ],
    ),
    (
        "Cache",
        &[
            ("save cache", "Write the cache to disk now."),
            ("reload cache", "Reload the cache from disk."),
            ("clear cache", "Empty the in-memory cache."),
        ],
    ),
];

/// Parses and executes one command line, returning the rendered reply.
///
/// `structured` selects inline markup for chat bridges; otherwise tables are
/// rendered for a terminal. Never fails: bad input yields a usage hint.
pub fn dispatch(ctx: &RunContext, line: &str, structured: bool) -> String {
    let reply = execute(ctx, line, structured);
    if structured {
        reply.to_markup()
    } else {
        reply.to_terminal()
    }
}

/// Like [`dispatch`] but returns the unrendered reply.
pub fn execute(ctx: &RunContext, line: &str, structured: bool) -> Reply {
    let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => return Reply::line(format!("⚠️ {e}")),
    };

    let _guard = ctx.command_guard();
    let reply = run(ctx, &command, structured);
    if command.is_mutating() {
        let outcome = reply.to_markup();
        info!(
            target: "audit",
            command = command.verb(),
            outcome = %strip_markup(outcome.lines().next().unwrap_or_default()),
            "Control command executed"
        );
    }
    reply
}

fn run(ctx: &RunContext, command: &Command, structured: bool) -> Reply {
    match command {
        Command::Stop => {
            ctx.request_stop();
            Reply::line("➡️ Command received: the run will stop after the current file.")
        }
        Command::Pause => {
            ctx.pause.pause();
            let reply = Reply::line("⏳ Run PAUSED. Send 'resume' to continue.");
            if structured {
                reply
            } else {
                stats_reply(ctx, "📊 Stats at pause time")
                    .blocks()
                    .iter()
                    .cloned()
                    .fold(reply, Reply::with)
            }
        }
        Command::Resume => {
            ctx.pause.resume();
            Reply::line("▶️ Run resumed.")
        }
        Command::SkipApi => {
            ctx.flags().skip_api = true;
            Reply::line("➡️ Command received: skipping the current API key...")
        }
        Command::SkipFile => {
            ctx.flags().skip_file = true;
            Reply::line("➡️ Command received: skipping the current file...")
        }
        Command::Stats => stats_reply(ctx, "📊 Current stats"),
        Command::AddKey(key) => match ctx.keys.add(key) {
            KeyChange::Added { preview, total } => {
                Reply::line(format!("✅ New API key `{preview}` added. Total keys: {total}."))
            }
            KeyChange::AlreadyPresent => Reply::line("ℹ️ This API key is already in the list."),
            _ => Reply::line("🛑 ERROR: the API key cannot be empty."),
        },
        Command::ListKeys => Reply::default().with(Block::Keys(ctx.keys.list())),
        Command::RemoveKey(index) => match ctx.keys.remove(*index) {
            Ok(KeyChange::Removed { preview, index }) => {
                Reply::line(format!("✅ API key `{preview}` at index {index} removed."))
            }
            Ok(KeyChange::OutOfRange { index }) => out_of_range(index),
            Ok(other) => Reply::line(format!("ℹ️ {other:?}")),
            Err(e) => critical(ctx, &e),
        },
        Command::Blacklist(index) => blacklist_reply(ctx, ctx.keys.blacklist(*index)),
        Command::Exhausted => blacklist_reply(ctx, ctx.keys.blacklist_active()),
        Command::ClearBlacklist => match ctx.keys.clear_blacklist() {
            0 => Reply::line("ℹ️ No key was blacklisted."),
            n => Reply::line(format!("✅ {n} keys removed from the blacklist.")),
        },
        Command::SetRpm(limit) => {
            ctx.limiter.set_limit(*limit);
            match limit {
                Some(n) => Reply::line(format!("✅ New RPM limit set to {n}.")),
                None => Reply::line("✅ RPM limit disabled."),
            }
        }
        Command::SetModel(model) => match ctx.keys.set_model(model) {
            Ok(()) => Reply::line(format!("✅ Model updated to '{model}'.")),
            Err(e) => Reply::line(format!("🛑 ERROR: could not set model '{model}': {e}")),
        },
        Command::SetMaxEntries(limit) => {
            ctx.flags().max_entries = *limit;
            match limit {
                Some(n) => Reply::line(format!("✅ Maximum entries per file set to {n}.")),
                None => Reply::line("✅ Maximum entries per file disabled."),
            }
        }
        Command::ShowRpm => rpm_reply(ctx),
        Command::ShowFileProgress => progress_reply(ctx),
        Command::Context => match ctx.flags().file_context.clone() {
            Some(context) => Reply::line(format!("ℹ️ Active context for the current file:\n`{context}`")),
            None => Reply::line("ℹ️ No context generated for the current file."),
        },
        Command::Prompt => match ctx.flags().last_prompt.clone() {
            Some(prompt) => Reply::default().with(Block::Code {
                title: "📝 Last prompt sent".to_string(),
                text: prompt,
            }),
            None => Reply::line("ℹ️ No translation prompt has been sent yet."),
        },
        Command::SaveCache => save_reply(ctx),
        Command::ReloadCache => {
            if !ctx.cache.is_persistent() {
                return Reply::line("⚠️ The persistent cache is disabled. Use --persistent-cache.");
            }
            match ctx.cache.reload() {
                Ok((before, after)) => Reply::line(format!("✅ Cache reloaded. Entries: {before} -> {after}.")),
                Err(e) => Reply::line(format!("🛑 ERROR: could not reload the cache: {e}")),
            }
        }
        Command::ClearCache => match ctx.cache.clear() {
            0 => Reply::line("ℹ️ The in-memory cache is already empty."),
            n => {
                let reply = Reply::line(format!("✅ In-memory cache cleared, {n} entries removed."));
                if ctx.cache.is_persistent() {
                    reply.with_line("ℹ️ The cache file on disk is untouched until the next 'save cache'.")
                } else {
                    reply
                }
            }
        },
        Command::Log(message) => {
            if ctx.settings.enable_file_log {
                info!(target: "audit", note = %message, "User note");
                Reply::line(format!("✅ Message '{message}' added to the log."))
            } else {
                Reply::line("⚠️ Cannot write to the log: file logging is disabled.")
            }
        }
        Command::Help => help_reply(structured),
        Command::Exit => Reply::line("ℹ️ Closing the interactive console."),
    }
}

fn out_of_range(index: usize) -> Reply {
    Reply::line(format!("🛑 ERROR: index {index} is out of range."))
}

/// A key command left no usable key: the worker stops at its next model call.
fn critical(ctx: &RunContext, error: &crate::error::AppError) -> Reply {
    warn!(error = %error, "Control command left the run without usable keys");
    ctx.notify(&format!("🛑 *CRITICAL ERROR:* {error}"));
    Reply::line(format!("🛑 CRITICAL: {error}. The run will stop."))
}

fn blacklist_reply(ctx: &RunContext, result: crate::error::Result<KeyChange>) -> Reply {
    match result {
        Ok(KeyChange::Blacklisted { preview, index }) => {
            Reply::line(format!("✅ API key `{preview}` at index {index} blacklisted."))
        }
        Ok(KeyChange::AlreadyBlacklisted { preview }) => {
            Reply::line(format!("ℹ️ API key `{preview}` is already blacklisted."))
        }
        Ok(KeyChange::OutOfRange { index }) => out_of_range(index),
        Ok(other) => Reply::line(format!("ℹ️ {other:?}")),
        Err(e) => critical(ctx, &e),
    }
}

fn save_reply(ctx: &RunContext) -> Reply {
    if !ctx.cache.is_persistent() {
        return Reply::line("⚠️ Warning: the persistent cache is disabled.");
    }
    match ctx.cache.save() {
        Ok(SaveOutcome::Saved(n)) => Reply::line(format!("➡️ Command received: cache saved ({n} entries).")),
        Ok(SaveOutcome::Empty) => Reply::line("ℹ️ The cache is empty, nothing to save."),
        Ok(SaveOutcome::Disabled) => Reply::line("⚠️ Warning: the persistent cache is disabled."),
        Err(e) => Reply::line(format!("🛑 ERROR: could not save the cache: {e}")),
    }
}

/// `Hh Mm Ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Run statistics followed by the key table.
pub fn stats_reply(ctx: &RunContext, title: &str) -> Reply {
    let counters = &ctx.counters;
    let elapsed = counters.elapsed();
    let files = counters.files_completed();

    let mut rows = vec![
        ("⏳ Elapsed time".to_string(), format_elapsed(elapsed)),
        ("✅ Files translated".to_string(), files.to_string()),
        ("✅ Entries translated".to_string(), counters.entries_translated().to_string()),
    ];
    if files > 0 {
        let average = Duration::from_secs_f64(elapsed.as_secs_f64() / files as f64);
        rows.push(("⏱️ Average time per file".to_string(), format_elapsed(average)));
    }
    rows.push(("💾 Cache hits".to_string(), counters.cache_hits().to_string()));
    rows.push(("📞 Total API calls".to_string(), ctx.keys.total_calls().to_string()));

    Reply::default()
        .with(Block::Section {
            title: title.to_string(),
            rows,
        })
        .with(Block::Keys(ctx.keys.list()))
}

fn rpm_reply(ctx: &RunContext) -> Reply {
    let usage = ctx.limiter.usage();
    let mut rows = vec![
        (
            "Limit".to_string(),
            usage.limit.map_or_else(|| "Disabled".to_string(), |l| format!("{l}/min")),
        ),
        ("Calls in the last 60s".to_string(), usage.in_window.to_string()),
    ];
    if let Some(remaining) = usage.remaining {
        rows.push(("Remaining calls".to_string(), remaining.to_string()));
    }
    if let Some(wait) = usage.wait {
        rows.push(("Required wait".to_string(), format!("{:.2} seconds", wait.as_secs_f64())));
    }
    Reply::default().with(Block::Section {
        title: "⏱️ RPM stats".to_string(),
        rows,
    })
}

fn progress_reply(ctx: &RunContext) -> Reply {
    let flags = ctx.flags();
    let progress = &flags.progress;
    if progress.total == 0 {
        return Reply::line("ℹ️ No file in progress.");
    }
    let percent = progress.processed as f64 / progress.total as f64 * 100.0;
    let mut rows = vec![("File type".to_string(), ctx.file_type().to_string().to_uppercase())];
    if let Some(name) = &progress.name {
        rows.push(("File".to_string(), name.clone()));
    }
    rows.push((
        "Entries processed".to_string(),
        format!("{} / {}", progress.processed, progress.total),
    ));
    rows.push(("Progress".to_string(), format!("{percent:.2}%")));
    if let Some(context) = &flags.file_context {
        let preview: String = context.chars().take(60).collect();
        rows.push(("Context".to_string(), format!("'{}...'", preview.trim())));
    }
    Reply::default().with(Block::Section {
        title: "📊 File progress".to_string(),
        rows,
    })
}

fn help_reply(structured: bool) -> Reply {
    let mut reply = Reply::line(if structured {
        "*🆘 COMMAND HELP*"
    } else {
        "🆘 COMMAND HELP"
    });
    for (section, commands) in HELP {
        if structured {
            reply = reply.with_line(format!("\n*{section}*"));
            for (command, description) in *commands {
                reply = reply.with_line(format!("`/{command}` - {description}"));
            }
        } else {
            reply = reply.with(Block::Section {
                title: (*section).to_string(),
                rows: commands
                    .iter()
                    .map(|(c, d)| ((*c).to_string(), (*d).to_string()))
                    .collect(),
            });
        }
    }
    reply
}
