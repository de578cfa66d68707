// src/bridge/telegram.rs

use super::{normalize_command, Notifier, EMPTY_REPLY};
use crate::config::TelegramConfig;
use crate::control;
use crate::error::{AppError, Result};
use crate::state::RunContext;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

/// Long-poll timeout passed to `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
    from: Option<Sender>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Sender {
    username: Option<String>,
}

/// Bot API URLs embed the token; strip them from transport errors.
fn redacted(err: reqwest::Error) -> AppError {
    AppError::from(err.without_url())
}

struct BotApi {
    http: Client,
    api_base: Url,
    token: Secret<String>,
    chat_id: String,
}

/// Telegram bot used both as notifier and as a remote command channel.
///
/// Cloning is cheap; every clone talks to the same chat.
#[derive(Clone)]
pub struct TelegramBridge {
    api: Arc<BotApi>,
    runtime: Handle,
}

impl std::fmt::Debug for TelegramBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBridge")
            .field("api_base", &self.api.api_base.as_str())
            .field("chat_id", &self.api.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramBridge {
    /// Must be called from within the tokio runtime; notifications are spawned
    /// on it.
    pub fn new(config: &TelegramConfig, api_base: Url) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()
            .map_err(|e| AppError::HttpClient {
                message: format!("failed to build the Telegram HTTP client: {e}"),
                status_code: None,
            })?;
        let runtime = Handle::try_current()
            .map_err(|e| AppError::internal(format!("Telegram bridge needs a tokio runtime: {e}")))?;
        Ok(Self {
            api: Arc::new(BotApi {
                http,
                api_base,
                token: config.bot_token.clone(),
                chat_id: config.chat_id.clone(),
            }),
            runtime,
        })
    }

    fn method_url(&self, method: &str) -> Result<Url> {
        // Tokens look like `123:abc`, joining them as a relative URL would read
        // the prefix as a scheme.
        let url = format!(
            "{}/bot{}/{method}",
            self.api.api_base.as_str().trim_end_matches('/'),
            self.api.token.expose_secret()
        );
        Ok(Url::parse(&url)?)
    }

    /// Sends `text` to the configured chat, formatted as Markdown. When Telegram
    /// rejects the markup the message is sent again as plain text.
    pub async fn send(&self, text: &str) -> Result<()> {
        match self.send_message(text, Some("Markdown")).await {
            Err(AppError::HttpClient { status_code: Some(400), message }) => {
                debug!(error = %message, "Markdown rejected, sending plain text");
                self.send_message(text, None).await
            }
            other => other,
        }
    }

    async fn send_message(&self, text: &str, parse_mode: Option<&'static str>) -> Result<()> {
        let url = self.method_url("sendMessage")?;
        let body = SendMessage {
            chat_id: &self.api.chat_id,
            text,
            parse_mode,
        };
        let response = self.api.http.post(url).json(&body).send().await.map_err(redacted)?;
        let status = response.status();
        let reply: ApiResponse<serde_json::Value> = response.json().await.map_err(redacted)?;
        if !reply.ok {
            return Err(AppError::HttpClient {
                message: reply
                    .description
                    .unwrap_or_else(|| "sendMessage failed".to_string()),
                status_code: Some(status.as_u16()),
            });
        }
        Ok(())
    }

    pub(crate) async fn fetch_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let mut url = self.method_url("getUpdates")?;
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("timeout", &POLL_TIMEOUT_SECS.to_string());
        let response = self.api.http.get(url).send().await.map_err(redacted)?;
        let status = response.status();
        let reply: ApiResponse<Vec<Update>> = response.json().await.map_err(redacted)?;
        if !reply.ok {
            return Err(AppError::HttpClient {
                message: reply
                    .description
                    .unwrap_or_else(|| "getUpdates failed".to_string()),
                status_code: Some(status.as_u16()),
            });
        }
        Ok(reply.result.unwrap_or_default())
    }

    /// Returns the command text of an update addressed to our chat.
    fn command_of(&self, update: &Update) -> Option<String> {
        let message = update.message.as_ref()?;
        if message.chat.id.to_string() != self.api.chat_id {
            debug!(chat_id = message.chat.id, "Ignoring message from another chat");
            return None;
        }
        let command = normalize_command(message.text.as_deref()?);
        info!(
            command = control::verb_of(command),
            from = message.from.as_ref().and_then(|s| s.username.as_deref()).unwrap_or("unknown"),
            "Telegram command received"
        );
        Some(command.to_string())
    }

    /// Long-polls for commands and answers each one in the chat. Runs until the
    /// task is aborted.
    pub async fn serve(self, ctx: Arc<RunContext>) {
        let mut offset = 0;
        info!("Telegram bridge listening for commands");
        loop {
            let updates = match self.fetch_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Telegram polling failed");
                    sleep(POLL_ERROR_BACKOFF).await;
                    continue;
                }
            };
            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(command) = self.command_of(&update) else {
                    continue;
                };
                let ctx = Arc::clone(&ctx);
                let reply = tokio::task::spawn_blocking(move || control::dispatch(&ctx, &command, true))
                    .await
                    .unwrap_or_else(|e| format!("🛑 Error while executing the command: {e}"));
                let reply = if reply.trim().is_empty() {
                    EMPTY_REPLY.to_string()
                } else {
                    reply
                };
                if let Err(e) = self.send(&reply).await {
                    warn!(error = %e, "Telegram reply could not be delivered");
                }
            }
        }
    }

    /// Sends the closing message, giving up after a few seconds.
    pub async fn shutdown(&self, message: &str) {
        match timeout(SHUTDOWN_TIMEOUT, self.send(message)).await {
            Ok(Ok(())) => debug!("Telegram bridge closed"),
            Ok(Err(e)) => warn!(error = %e, "Telegram closing message failed"),
            Err(_) => warn!("Telegram closing message timed out"),
        }
    }
}

impl Notifier for TelegramBridge {
    fn notify(&self, message: &str) {
        let bridge = self.clone();
        let message = message.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = bridge.send(&message).await {
                warn!(error = %e, "Telegram notification failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bridge(server: &MockServer) -> TelegramBridge {
        let config = TelegramConfig {
            bot_token: Secret::new("123:abc".to_string()),
            chat_id: "42".to_string(),
        };
        TelegramBridge::new(&config, Url::parse(&server.uri()).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_transport_errors_do_not_expose_the_token() {
        let config = TelegramConfig {
            bot_token: Secret::new("123:abc".to_string()),
            chat_id: "42".to_string(),
        };
        // Nothing listens on the discard port.
        let bridge = TelegramBridge::new(&config, Url::parse("http://127.0.0.1:9").unwrap()).unwrap();

        let err = bridge.send("hello").await.unwrap_err();

        assert!(matches!(err, AppError::HttpClient { .. }));
        assert!(!err.to_string().contains("123:abc"), "token leaked: {err}");
    }

    #[tokio::test]
    async fn test_send_uses_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "42", "text": "*hi*", "parse_mode": "Markdown"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        bridge(&server).send("*hi*").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_markdown_falls_back_to_plain_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({"parse_mode": "Markdown"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: can't parse entities"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {}})))
            .mount(&server)
            .await;

        bridge(&server).send("key_with_underscores").await.unwrap();
    }

    #[tokio::test]
    async fn test_updates_are_filtered_by_chat() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bot123:abc/getUpdates"))
            .and(query_param("offset", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {"update_id": 7, "message": {"chat": {"id": 42}, "text": "/stats", "from": {"username": "op"}}},
                    {"update_id": 8, "message": {"chat": {"id": 99}, "text": "stop"}},
                    {"update_id": 9}
                ]
            })))
            .mount(&server)
            .await;

        let bridge = bridge(&server);
        let updates = bridge.fetch_updates(7).await.unwrap();
        assert_eq!(updates.len(), 3);
        let commands: Vec<String> = updates.iter().filter_map(|u| bridge.command_of(u)).collect();
        assert_eq!(commands, vec!["stats"]);
    }
}
