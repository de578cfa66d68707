//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use gemini_l10n::bridge::{MemoryNotifier, Notifier};
use gemini_l10n::cache::TranslationCache;
use gemini_l10n::config::Settings;
use gemini_l10n::error::ModelError;
use gemini_l10n::gateway::{ModelClient, ModelGateway, RetryPolicy};
use gemini_l10n::key_manager::KeyManager;
use gemini_l10n::RunContext;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, Secret};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Model stub: answers from a script, then with a fixed reply. Keys listed as
/// rejected always fail with permission denied.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    default_reply: String,
    rejected_keys: Vec<String>,
    active_key: Mutex<String>,
    prompts: Mutex<Vec<String>>,
    keys_used: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new(default_reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            rejected_keys: Vec::new(),
            active_key: Mutex::new(String::new()),
            prompts: Mutex::new(Vec::new()),
            keys_used: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, script: Vec<Result<String, ModelError>>) -> Self {
        *self.script.lock() = script.into();
        self
    }

    pub fn reject_key(mut self, key: &str) -> Self {
        self.rejected_keys.push(key.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn keys_used(&self) -> Vec<String> {
        self.keys_used.lock().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let key = self.active_key.lock().clone();
        self.prompts.lock().push(prompt.to_string());
        self.keys_used.lock().push(key.clone());
        if self.rejected_keys.contains(&key) {
            return Err(ModelError::PermissionDenied(format!("API key {key} not valid")));
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_reply.clone()))
    }

    fn configure(&self, key: &Secret<String>, _model: &str) -> Result<(), ModelError> {
        *self.active_key.lock() = key.expose_secret().clone();
        Ok(())
    }
}

pub fn settings(input: &Path) -> Settings {
    Settings {
        input: input.to_path_buf(),
        ..Settings::default()
    }
}

/// Run context builder with no retry backoff and no call spacing.
pub struct TestContextBuilder {
    settings: Settings,
    keys: Vec<String>,
    client: Arc<ScriptedClient>,
    notifier: Arc<MemoryNotifier>,
    cache: Option<TranslationCache>,
}

impl TestContextBuilder {
    pub fn new(client: Arc<ScriptedClient>) -> Self {
        Self {
            settings: Settings::default(),
            keys: vec!["key-one-aaaa".to_string()],
            client,
            notifier: Arc::new(MemoryNotifier::default()),
            cache: None,
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn notifier(&self) -> Arc<MemoryNotifier> {
        Arc::clone(&self.notifier)
    }

    pub fn build(self) -> RunContext {
        let notifier: Arc<dyn Notifier> = self.notifier;
        let client: Arc<dyn ModelClient> = self.client;
        let keys = KeyManager::new(
            self.keys.into_iter().map(Secret::new).collect(),
            &self.settings.model,
            Arc::clone(&client),
            Arc::clone(&notifier),
        )
        .expect("test keys are valid");
        let gateway = ModelGateway::new(client)
            .with_retry(RetryPolicy::single_attempt())
            .with_spacing(Duration::ZERO);
        RunContext::new(
            self.settings,
            keys,
            self.cache.unwrap_or_else(TranslationCache::in_memory),
            gateway,
            notifier,
        )
    }
}
