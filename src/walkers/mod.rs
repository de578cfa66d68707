// src/walkers/mod.rs

//! Format walkers: turn a localization file into translatable units and take
//! the translations back.

pub mod csv;
pub mod json;
pub mod po;

use crate::error::Result;
use std::path::Path;

pub use self::csv::CsvDocument;
pub use self::json::JsonDocument;
pub use self::po::PoDocument;

/// One text waiting for translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit<L> {
    /// Where the translation goes back to.
    pub location: L,
    pub text: String,
    /// Context attached to this entry alone, e.g. a gettext `msgctxt`.
    pub entry_context: Option<String>,
    /// Human readable position used in logs.
    pub label: String,
}

/// A loaded localization file.
pub trait Document {
    type Location;

    /// Every translatable source text of the file, in file order.
    fn texts(&self) -> Vec<String>;

    /// Units that still need work, in file order.
    fn units(&self) -> Vec<Unit<Self::Location>>;

    /// Writes a translation back. Applying the same value twice is harmless.
    fn apply(&mut self, unit: &Unit<Self::Location>, translated: &str);

    /// Serialises the (possibly partially) translated document.
    fn write(&self, path: &Path) -> Result<()>;

    /// First `limit` translatable texts, or all of them.
    fn sample(&self, limit: Option<usize>) -> Vec<String> {
        let texts = self.texts();
        match limit {
            Some(limit) => texts.into_iter().take(limit).collect(),
            None => texts,
        }
    }

    /// Dynamic context sent with `unit`.
    fn dynamic_context(&self, file_context: Option<&str>, _unit: &Unit<Self::Location>) -> Option<String> {
        file_context.map(str::to_string)
    }
}

/// Writes one translated text per line.
pub fn write_translations(path: &Path, translations: &[String]) -> Result<()> {
    let mut content = translations.join("\n");
    content.push('\n');
    std::fs::write(path, content)
        .map_err(|e| crate::error::AppError::io(format!("write {}", path.display()), &e))
}
