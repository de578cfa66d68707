// src/bridge/mod.rs

//! Out-of-band notifications and remote control channels.

pub mod telegram;

use parking_lot::Mutex;

pub use telegram::TelegramBridge;

/// Reply sent for commands that produce no output.
pub const EMPTY_REPLY: &str = "✅ Command executed.";

/// Fire-and-forget push channel. Implementations must not block and must
/// swallow (and log) delivery failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Used when no bridge is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _message: &str) {}
}

/// Keeps every message in memory. Handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Normalises a chat command: trims it and drops the leading `/` bots use.
pub fn normalize_command(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix('/').unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_command() {
        assert_eq!(normalize_command("/stats"), "stats");
        assert_eq!(normalize_command("  set rpm 10 "), "set rpm 10");
        assert_eq!(normalize_command("/"), "");
    }

    #[test]
    fn test_memory_notifier_records_in_order() {
        let notifier = MemoryNotifier::default();
        notifier.notify("one");
        notifier.notify("two");
        assert_eq!(notifier.messages(), vec!["one", "two"]);
    }
}
