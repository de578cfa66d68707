// src/gateway/mod.rs

pub mod classify;
pub mod gemini;
pub mod retry;

use crate::error::{AppError, ModelError, Result};
use crate::key_manager::{KeyManager, RotationReason};
use crate::rate_limit::RateLimiter;
use crate::state::PauseGate;
use async_trait::async_trait;
use secrecy::Secret;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{instrument, warn};

pub use gemini::GeminiClient;
pub use retry::RetryPolicy;

/// Fixed spacing enforced before every outbound call.
pub const BASE_CALL_INTERVAL: Duration = Duration::from_millis(200);

/// A generative model reachable with one credential at a time.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends `prompt` and returns the trimmed response text.
    async fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Binds the client to `key` and `model` for subsequent calls.
    fn configure(&self, key: &Secret<String>, model: &str) -> Result<(), ModelError>;
}

/// Run-wide collaborators a call has to go through.
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    pub limiter: &'a RateLimiter,
    pub pause: &'a PauseGate,
    pub keys: &'a KeyManager,
    /// Rotate instead of waiting on the RPM window or retrying locally.
    pub rotate_on_limit_or_error: bool,
}

/// Single model call with rate limiting, call spacing and local retries.
pub struct ModelGateway {
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
    spacing: Duration,
}

impl ModelGateway {
    #[must_use]
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            spacing: BASE_CALL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn client(&self) -> Arc<dyn ModelClient> {
        Arc::clone(&self.client)
    }

    /// Returns the model text, or `AppError::Model` once local retries are
    /// exhausted or not applicable. Any other error is fatal for the run.
    #[instrument(level = "debug", skip_all, fields(prompt.len = prompt.len()))]
    pub async fn call(&self, prompt: &str, ctx: CallContext<'_>) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut rotate = || ctx.keys.rotate(RotationReason::RateLimit);
            let rotate_hook: Option<&mut (dyn FnMut() -> Result<bool> + Send)> =
                if ctx.rotate_on_limit_or_error {
                    Some(&mut rotate)
                } else {
                    None
                };
            ctx.limiter.admit(ctx.pause, rotate_hook).await?;
            sleep(self.spacing).await;

            match self.client.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if self.retry.should_retry(&e, attempt, ctx.rotate_on_limit_or_error) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        api_key.preview = %ctx.keys.active_preview(),
                        error = %e,
                        retry_in = ?delay,
                        "Model call failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(AppError::Model(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NullNotifier;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use tokio::time::Instant;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            *self.calls.lock() += 1;
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok("done".to_string()))
        }

        fn configure(&self, _key: &Secret<String>, _model: &str) -> Result<(), ModelError> {
            Ok(())
        }
    }

    fn keys(client: Arc<Scripted>) -> KeyManager {
        KeyManager::new(
            vec![Secret::new("key-A".into()), Secret::new("key-B".into())],
            "gemini-test",
            client,
            Arc::new(NullNotifier),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_with_backoff() {
        let client = Scripted::new(vec![
            Err(ModelError::ServiceUnavailable("503".into())),
            Err(ModelError::ResourceExhausted("429".into())),
        ]);
        let keys = keys(client.clone());
        let limiter = RateLimiter::new(None);
        let pause = PauseGate::new();
        let gateway = ModelGateway::new(client.clone());
        let ctx = CallContext {
            limiter: &limiter,
            pause: &pause,
            keys: &keys,
            rotate_on_limit_or_error: false,
        };

        let start = Instant::now();
        assert_eq!(gateway.call("prompt", ctx).await.unwrap(), "done");
        assert_eq!(*client.calls.lock(), 3);
        // 3 x 0.2s spacing + 2s + 3s backoff
        let elapsed = start.elapsed().as_secs_f64();
        assert!((elapsed - 5.6).abs() < 0.05, "elapsed {elapsed}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_after_three_attempts() {
        let client = Scripted::new(vec![
            Err(ModelError::Internal("500".into())),
            Err(ModelError::Internal("500".into())),
            Err(ModelError::Internal("500".into())),
        ]);
        let keys = keys(client.clone());
        let limiter = RateLimiter::new(None);
        let pause = PauseGate::new();
        let gateway = ModelGateway::new(client.clone());
        let ctx = CallContext {
            limiter: &limiter,
            pause: &pause,
            keys: &keys,
            rotate_on_limit_or_error: false,
        };

        let err = gateway.call("prompt", ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Model(ModelError::Internal(_))));
        assert_eq!(*client.calls.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_policy_suppresses_retries() {
        let client = Scripted::new(vec![Err(ModelError::DeadlineExceeded("504".into()))]);
        let keys = keys(client.clone());
        let limiter = RateLimiter::new(None);
        let pause = PauseGate::new();
        let gateway = ModelGateway::new(client.clone());
        let ctx = CallContext {
            limiter: &limiter,
            pause: &pause,
            keys: &keys,
            rotate_on_limit_or_error: true,
        };

        assert!(gateway.call("prompt", ctx).await.is_err());
        assert_eq!(*client.calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_is_not_retried() {
        let client = Scripted::new(vec![Err(ModelError::PermissionDenied("403".into()))]);
        let keys = keys(client.clone());
        let limiter = RateLimiter::new(None);
        let pause = PauseGate::new();
        let gateway = ModelGateway::new(client.clone());
        let ctx = CallContext {
            limiter: &limiter,
            pause: &pause,
            keys: &keys,
            rotate_on_limit_or_error: false,
        };

        let err = gateway.call("prompt", ctx).await.unwrap_err();
        assert!(matches!(err, AppError::Model(ModelError::PermissionDenied(_))));
        assert_eq!(*client.calls.lock(), 1);
    }
}
