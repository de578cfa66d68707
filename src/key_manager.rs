// src/key_manager.rs

use crate::bridge::Notifier;
use crate::error::{AppError, ModelError, Result};
use crate::gateway::ModelClient;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, Secret};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Consecutive transient failures after which a rotation is forced.
pub const MAX_MAJOR_FAILURES: u32 = 6;

/// Why a rotation was requested. Shown in logs and notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationReason {
    User,
    FailureThreshold,
    ApiError,
    RateLimit,
    Blacklisted,
    Removed,
}

impl std::fmt::Display for RotationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::User => "user command",
            Self::FailureThreshold => "failure threshold reached",
            Self::ApiError => "API error",
            Self::RateLimit => "RPM limit reached",
            Self::Blacklisted => "key blacklisted",
            Self::Removed => "active key removed",
        };
        f.write_str(text)
    }
}

/// One line of the key table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRow {
    pub index: usize,
    pub preview: String,
    pub calls: u64,
    pub active: bool,
    pub blacklisted: bool,
}

/// Result of a membership change requested from the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChange {
    Added { preview: String, total: usize },
    AlreadyPresent,
    Removed { preview: String, index: usize },
    Blacklisted { preview: String, index: usize },
    AlreadyBlacklisted { preview: String },
    OutOfRange { index: usize },
    Empty,
}

#[derive(Debug)]
struct KeyRing {
    keys: Vec<Secret<String>>,
    calls: Vec<u64>,
    blacklist: BTreeSet<usize>,
    active: usize,
    model: String,
}

impl KeyRing {
    fn usable(&self) -> usize {
        self.keys.len() - self.blacklist.len()
    }

    fn active_preview(&self) -> String {
        self.keys
            .get(self.active)
            .map(|k| KeyManager::preview(k.expose_secret()))
            .unwrap_or_default()
    }
}

/// Ordered credential set with an active index, a blacklist and the rotation
/// policy. Every transition reconfigures the model client with the new key.
pub struct KeyManager {
    ring: Mutex<KeyRing>,
    major_failures: AtomicU32,
    client: Arc<dyn ModelClient>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.lock();
        f.debug_struct("KeyManager")
            .field("keys", &ring.keys.len())
            .field("active", &ring.active)
            .field("blacklist", &ring.blacklist)
            .field("model", &ring.model)
            .finish_non_exhaustive()
    }
}

impl KeyManager {
    /// Builds the manager and configures the client with the first key.
    ///
    /// Keys are deduplicated keeping the first occurrence; an empty list is a
    /// setup error.
    #[instrument(skip_all, name = "key_manager_init", fields(model = %model))]
    pub fn new(
        keys: Vec<Secret<String>>,
        model: &str,
        client: Arc<dyn ModelClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let mut unique: Vec<Secret<String>> = Vec::with_capacity(keys.len());
        for key in keys {
            let trimmed = key.expose_secret().trim();
            if trimmed.is_empty()
                || unique.iter().any(|k| k.expose_secret() == trimmed)
            {
                continue;
            }
            unique.push(Secret::new(trimmed.to_string()));
        }
        if unique.is_empty() {
            return Err(AppError::NoKeysConfigured);
        }

        client
            .configure(&unique[0], model)
            .map_err(|e| AppError::config_validation(
                format!("Model '{model}' could not be initialised: {e}"),
                Some("model"),
            ))?;

        info!(
            keys.total = unique.len(),
            api_key.preview = %Self::preview(unique[0].expose_secret()),
            "Model client ready"
        );

        let calls = vec![0; unique.len()];
        Ok(Self {
            ring: Mutex::new(KeyRing {
                keys: unique,
                calls,
                blacklist: BTreeSet::new(),
                active: 0,
                model: model.to_string(),
            }),
            major_failures: AtomicU32::new(0),
            client,
            notifier,
        })
    }

    /// Suffix-only rendering of a key, e.g. `...a1b2`.
    pub fn preview(key: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        let start = chars.len().saturating_sub(4);
        format!("...{}", chars[start..].iter().collect::<String>())
    }

    pub fn len(&self) -> usize {
        self.ring.lock().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().keys.is_empty()
    }

    pub fn usable(&self) -> usize {
        self.ring.lock().usable()
    }

    pub fn active_index(&self) -> usize {
        self.ring.lock().active
    }

    pub fn active_preview(&self) -> String {
        self.ring.lock().active_preview()
    }

    pub fn model(&self) -> String {
        self.ring.lock().model.clone()
    }

    pub fn is_blacklisted(&self, index: usize) -> bool {
        self.ring.lock().blacklist.contains(&index)
    }

    /// Counts one successful call against the active key.
    pub fn record_call(&self) {
        let mut ring = self.ring.lock();
        let active = ring.active;
        if let Some(count) = ring.calls.get_mut(active) {
            *count += 1;
        }
    }

    pub fn total_calls(&self) -> u64 {
        self.ring.lock().calls.iter().sum()
    }

    /// Registers a transient failure that survived local retries and returns
    /// the new consecutive count.
    pub fn record_major_failure(&self) -> u32 {
        self.major_failures.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn major_failures(&self) -> u32 {
        self.major_failures.load(Ordering::SeqCst)
    }

    pub fn reset_major_failures(&self) {
        self.major_failures.store(0, Ordering::SeqCst);
    }

    pub fn list(&self) -> Vec<KeyRow> {
        let ring = self.ring.lock();
        ring.keys
            .iter()
            .enumerate()
            .map(|(index, key)| KeyRow {
                index,
                preview: Self::preview(key.expose_secret()),
                calls: ring.calls.get(index).copied().unwrap_or(0),
                active: index == ring.active,
                blacklisted: ring.blacklist.contains(&index),
            })
            .collect()
    }

    /// Advances to the next usable key.
    ///
    /// Returns `Ok(false)` when rotating is pointless (a single usable key that
    /// is already active) or when the new key could not be configured and the
    /// previous one was restored. Zero usable keys is fatal.
    #[instrument(level = "info", skip(self), fields(reason = %reason))]
    pub fn rotate(&self, reason: RotationReason) -> Result<bool> {
        let mut ring = self.ring.lock();
        let mut outbox = Vec::new();
        let result = self.rotate_locked(&mut ring, &reason, &mut outbox);
        drop(ring);
        self.flush(outbox);
        result
    }

    fn rotate_locked(
        &self,
        ring: &mut KeyRing,
        reason: &RotationReason,
        outbox: &mut Vec<String>,
    ) -> Result<bool> {
        let usable = ring.usable();
        if usable == 0 {
            error!("All API keys are blacklisted");
            outbox.push("🛑 *CRITICAL:* all API keys are blacklisted.".to_string());
            return Err(AppError::KeysExhausted);
        }
        if usable <= 1 && !ring.blacklist.contains(&ring.active) {
            warn!("Only one usable API key available, rotation skipped");
            return Ok(false);
        }

        let previous = ring.active;
        let len = ring.keys.len();
        let mut candidate = previous;
        loop {
            candidate = (candidate + 1) % len;
            if !ring.blacklist.contains(&candidate) {
                break;
            }
            if candidate == previous {
                error!("No usable API key found after a full cycle");
                return Err(AppError::KeysExhausted);
            }
        }

        ring.active = candidate;
        info!(reason = %reason, "Rotating API key");
        outbox.push(format!("🔄 *Rotating API key...*\n_Reason:_ {reason}"));

        let new_preview = ring.active_preview();
        match self.client.configure(&ring.keys[candidate], &ring.model) {
            Ok(()) => {
                info!(api_key.preview = %new_preview, index = candidate, "Rotation completed");
                outbox.push(format!("✅ *Rotation completed.*\n*Active API key:* `{new_preview}`"));
                self.reset_major_failures();
                Ok(true)
            }
            Err(e) => {
                error!(api_key.preview = %new_preview, error = %e, "Configuring the new API key failed");
                outbox.push(format!("❌ *ERROR:* configuring API key `{new_preview}` failed."));
                self.revert_locked(ring, previous, &e)
            }
        }
    }

    fn revert_locked(&self, ring: &mut KeyRing, previous: usize, cause: &ModelError) -> Result<bool> {
        if ring.blacklist.contains(&previous) || previous >= ring.keys.len() {
            return Err(AppError::KeyRotation {
                message: format!("rotation failed ({cause}) and the previous key is blacklisted"),
            });
        }
        ring.active = previous;
        self.client
            .configure(&ring.keys[previous], &ring.model)
            .map_err(|e| AppError::KeyRotation {
                message: format!("restoring the previous API key failed: {e}"),
            })?;
        info!(api_key.preview = %ring.active_preview(), "Previous API key restored");
        Ok(false)
    }

    /// Blacklists `index` and rotates away from it if it is active.
    #[instrument(level = "info", skip(self))]
    pub fn blacklist(&self, index: usize) -> Result<KeyChange> {
        let mut ring = self.ring.lock();
        let Some(key) = ring.keys.get(index) else {
            return Ok(KeyChange::OutOfRange { index });
        };
        let preview = Self::preview(key.expose_secret());
        if !ring.blacklist.insert(index) {
            return Ok(KeyChange::AlreadyBlacklisted { preview });
        }
        warn!(api_key.preview = %preview, index, "API key blacklisted");

        let mut outbox = Vec::new();
        let result = if index == ring.active {
            self.rotate_locked(&mut ring, &RotationReason::Blacklisted, &mut outbox)
        } else {
            Ok(true)
        };
        drop(ring);
        self.flush(outbox);
        result.map(|_| KeyChange::Blacklisted { preview, index })
    }

    /// Blacklists whatever key is active right now.
    pub fn blacklist_active(&self) -> Result<KeyChange> {
        let index = self.active_index();
        self.blacklist(index)
    }

    /// Removes every index from the blacklist; returns how many were cleared.
    pub fn clear_blacklist(&self) -> usize {
        let mut ring = self.ring.lock();
        let count = ring.blacklist.len();
        ring.blacklist.clear();
        count
    }

    #[instrument(level = "info", skip_all)]
    pub fn add(&self, key: &str) -> KeyChange {
        let key = key.trim();
        if key.is_empty() {
            return KeyChange::Empty;
        }
        let mut ring = self.ring.lock();
        if ring.keys.iter().any(|k| k.expose_secret() == key) {
            return KeyChange::AlreadyPresent;
        }
        ring.keys.push(Secret::new(key.to_string()));
        ring.calls.push(0);
        let index = ring.keys.len() - 1;
        ring.blacklist.remove(&index);
        let preview = Self::preview(key);
        info!(api_key.preview = %preview, total = ring.keys.len(), "API key added");
        KeyChange::Added {
            preview,
            total: ring.keys.len(),
        }
    }

    /// Deletes the key at `index`, shifting every later key (and its counter
    /// and blacklist membership) down by one.
    #[instrument(level = "info", skip(self))]
    pub fn remove(&self, index: usize) -> Result<KeyChange> {
        let mut ring = self.ring.lock();
        if index >= ring.keys.len() {
            return Ok(KeyChange::OutOfRange { index });
        }
        let removed = ring.keys.remove(index);
        ring.calls.remove(index);
        let preview = Self::preview(removed.expose_secret());
        ring.blacklist = ring
            .blacklist
            .iter()
            .filter(|i| **i != index)
            .map(|i| if *i > index { i - 1 } else { *i })
            .collect();

        let mut outbox = Vec::new();
        let result = if ring.active == index {
            if ring.keys.is_empty() {
                error!("Every API key has been removed");
                Err(AppError::KeysExhausted)
            } else {
                warn!("The removed key was active, rotating");
                ring.active = index.min(ring.keys.len() - 1);
                let rotated = self.rotate_locked(&mut ring, &RotationReason::Removed, &mut outbox);
                match rotated {
                    // The clamped index is a different key already; bind it
                    // when no rotation happened.
                    Ok(false) => self
                        .client
                        .configure(&ring.keys[ring.active], &ring.model)
                        .map(|()| false)
                        .map_err(AppError::from),
                    other => other,
                }
            }
        } else {
            if ring.active > index {
                ring.active -= 1;
            }
            Ok(true)
        };
        drop(ring);
        self.flush(outbox);
        result.map(|_| KeyChange::Removed { preview, index })
    }

    /// Points the client at another model, keeping the active key.
    #[instrument(level = "info", skip(self))]
    pub fn set_model(&self, model: &str) -> Result<(), ModelError> {
        let model = model.trim();
        if model.is_empty() {
            return Err(ModelError::Other("model name cannot be empty".to_string()));
        }
        let mut ring = self.ring.lock();
        let Some(key) = ring.keys.get(ring.active) else {
            return Err(ModelError::Other("no API key configured".to_string()));
        };
        self.client.configure(key, model)?;
        ring.model = model.to_string();
        info!(model = %model, "Model updated");
        Ok(())
    }

    fn flush(&self, outbox: Vec<String>) {
        for message in outbox {
            self.notifier.notify(&message);
        }
    }
}
