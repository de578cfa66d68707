// src/walkers/json.rs

use super::{Document, Unit};
use crate::classifier::is_translatable_value;
use crate::config::JsonOptions;
use crate::error::{AppError, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// JSON document whose string values under selected keys are translated.
#[derive(Debug, Clone)]
pub struct JsonDocument {
    name: String,
    data: Value,
    keys: HashSet<String>,
    match_full_path: bool,
}

/// A matched string value.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonLocation {
    /// JSON pointer used to write the translation back.
    pub pointer: String,
    /// Dotted path, arrays as `path[i]`.
    pub path: String,
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

impl JsonDocument {
    pub fn load(path: &Path, options: &JsonOptions) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| AppError::io(format!("read {}", path.display()), &e))?;
        let data = serde_json::from_str(&content).map_err(|e| AppError::FormatParse {
            format: "JSON",
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            data,
            keys: options.keys.iter().cloned().collect(),
            match_full_path: options.match_full_path,
        })
    }

    pub fn value(&self) -> &Value {
        &self.data
    }

    fn is_match(&self, key: &str, path: &str) -> bool {
        if self.match_full_path {
            self.keys.contains(path)
        } else {
            self.keys.contains(key)
        }
    }

    fn collect(&self, value: &Value, path: &str, pointer: &str, found: &mut Vec<(JsonLocation, String)>) {
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    let child_path = if path.is_empty() { key.clone() } else { format!("{path}.{key}") };
                    let child_pointer = format!("{pointer}/{}", escape_pointer_token(key));
                    if self.is_match(key, &child_path) && is_translatable_value(child) {
                        if let Value::String(text) = child {
                            found.push((
                                JsonLocation {
                                    pointer: child_pointer.clone(),
                                    path: child_path.clone(),
                                },
                                text.clone(),
                            ));
                        }
                    }
                    self.collect(child, &child_path, &child_pointer, found);
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.collect(item, &format!("{path}[{i}]"), &format!("{pointer}/{i}"), found);
                }
            }
            _ => {}
        }
    }

    fn matches(&self) -> Vec<(JsonLocation, String)> {
        let mut found = Vec::new();
        self.collect(&self.data, "", "", &mut found);
        found
    }
}

impl Document for JsonDocument {
    type Location = JsonLocation;

    fn texts(&self) -> Vec<String> {
        self.matches().into_iter().map(|(_, text)| text).collect()
    }

    fn units(&self) -> Vec<Unit<JsonLocation>> {
        self.matches()
            .into_iter()
            .map(|(location, text)| {
                let label = format!("JSON '{}' | Key '{}'", self.name, location.path);
                Unit {
                    location,
                    text,
                    entry_context: None,
                    label,
                }
            })
            .collect()
    }

    fn apply(&mut self, unit: &Unit<JsonLocation>, translated: &str) {
        if let Some(slot) = self.data.pointer_mut(&unit.location.pointer) {
            *slot = Value::String(translated.to_string());
        }
    }

    fn write(&self, path: &Path) -> Result<()> {
        let mut buffer = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
        self.data.serialize(&mut serializer)?;
        fs::write(path, buffer).map_err(|e| AppError::io(format!("write {}", path.display()), &e))
    }
}
