// src/cache.rs

use crate::error::{AppError, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default file name of the persistent cache.
pub const CACHE_FILE_NAME: &str = "translation_cache.json";

/// Minimum time between two opportunistic saves.
pub const PERIODIC_SAVE_INTERVAL: Duration = Duration::from_secs(600);

/// Outcome of a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(usize),
    Disabled,
    Empty,
}

/// Fingerprint to translation (or generated file context) store.
///
/// Only the worker writes entries; the control plane reads for display and may
/// clear, reload or save on request.
#[derive(Debug)]
pub struct TranslationCache {
    entries: RwLock<HashMap<String, String>>,
    path: Option<PathBuf>,
    last_save: Mutex<Option<Instant>>,
}

impl TranslationCache {
    /// In-memory cache, `save` and `load` are no-ops.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            path: None,
            last_save: Mutex::new(None),
        }
    }

    /// Cache persisted to `path`. Call [`TranslationCache::load`] to read it.
    #[must_use]
    pub fn persistent(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            path: Some(path.into()),
            last_save: Mutex::new(None),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, fingerprint: &str) -> Option<String> {
        let value = self.entries.read().get(fingerprint).cloned();
        if value.is_some() {
            debug!(cache_key = %fingerprint, "Cache hit");
        }
        value
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.entries.read().contains_key(fingerprint)
    }

    pub fn put(&self, fingerprint: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(fingerprint.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Empties the in-memory map only. Returns the number of removed entries.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        drop(entries);
        info!(cleared_entries = count, "Cache cleared");
        count
    }

    /// Loads the persisted file, replacing the in-memory map.
    ///
    /// A missing file starts an empty cache; an undecodable file (bad UTF-8 or
    /// bad JSON) is logged and also starts empty. Only unexpected I/O errors
    /// are returned.
    pub fn load(&self) -> Result<usize> {
        let Some(path) = self.path.as_deref() else {
            return Ok(0);
        };

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(cache.path = %path.display(), "Cache file not found, a new one will be created");
                *self.entries.write() = HashMap::new();
                *self.last_save.lock() = None;
                return Ok(0);
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(cache.path = %path.display(), error = %e, "Cache file is not valid UTF-8, starting empty");
                *self.entries.write() = HashMap::new();
                *self.last_save.lock() = None;
                return Ok(0);
            }
            Err(e) => return Err(AppError::io("read cache file", &e)),
        };

        match serde_json::from_str::<HashMap<String, String>>(&contents) {
            Ok(map) => {
                let count = map.len();
                *self.entries.write() = map;
                *self.last_save.lock() = Some(Instant::now());
                info!(cache.path = %path.display(), entries = count, "Persistent cache loaded");
                Ok(count)
            }
            Err(e) => {
                warn!(cache.path = %path.display(), error = %e, "Cache file is unreadable, starting empty");
                *self.entries.write() = HashMap::new();
                *self.last_save.lock() = None;
                Ok(0)
            }
        }
    }

    /// Discards the in-memory map and loads it again from disk.
    /// Returns the entry counts before and after.
    pub fn reload(&self) -> Result<(usize, usize)> {
        let before = self.len();
        let after = self.load()?;
        Ok((before, after))
    }

    /// Atomically rewrites the cache file with the full mapping.
    pub fn save(&self) -> Result<SaveOutcome> {
        let Some(path) = self.path.as_deref() else {
            return Ok(SaveOutcome::Disabled);
        };

        // Sorted output keeps diffs of the cache file readable.
        let snapshot: BTreeMap<String, String> = {
            let entries = self.entries.read();
            if entries.is_empty() {
                info!("Cache save skipped: the cache is empty");
                return Ok(SaveOutcome::Empty);
            }
            entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        snapshot.serialize(&mut serializer)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| AppError::io("create temporary cache file", &e))?;
        tmp.write_all(&buffer)
            .map_err(|e| AppError::io("write temporary cache file", &e))?;
        tmp.persist(path)?;

        *self.last_save.lock() = Some(Instant::now());
        info!(cache.path = %path.display(), entries = snapshot.len(), "Cache saved");
        Ok(SaveOutcome::Saved(snapshot.len()))
    }

    /// Saves when the cache was never saved or `interval` has elapsed since the
    /// last save. Returns `true` if a save happened.
    pub fn save_if_due(&self, interval: Duration) -> Result<bool> {
        if !self.is_persistent() {
            return Ok(false);
        }
        let due = self
            .last_save
            .lock()
            .map_or(true, |last| last.elapsed() >= interval);
        if !due {
            return Ok(false);
        }
        info!("Periodic cache save");
        Ok(matches!(self.save()?, SaveOutcome::Saved(_)))
    }
}
