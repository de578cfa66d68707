// src/walkers/csv.rs

use super::{Document, Unit};
use crate::classifier::is_translatable;
use crate::config::CsvOptions;
use crate::error::{AppError, Result};
use ::csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use std::path::Path;
use tracing::{info, warn};

/// Delimited text file. The first row is a header and is never translated.
#[derive(Debug, Clone)]
pub struct CsvDocument {
    name: String,
    options: CsvOptions,
    source: Vec<Vec<String>>,
    output: Vec<Vec<String>>,
    resumed: bool,
}

fn read_rows(path: &Path, delimiter: u8) -> Result<Vec<Vec<String>>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| parse_error(path, &e))?;
    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| parse_error(path, &e))
        })
        .collect()
}

fn parse_error(path: &Path, err: &::csv::Error) -> AppError {
    AppError::FormatParse {
        format: "CSV",
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

impl CsvDocument {
    /// Loads `path`. With `resume_from`, rows of an earlier output file with the
    /// same row count replace the output rows so finished rows are skipped.
    pub fn load(path: &Path, options: &CsvOptions, resume_from: Option<&Path>) -> Result<Self> {
        let source = read_rows(path, options.delimiter)?;
        let mut output = source.clone();
        let mut resumed = false;

        if let Some(previous) = resume_from.filter(|p| p.exists()) {
            match read_rows(previous, options.delimiter) {
                Ok(rows) if rows.len() == source.len() => {
                    info!(rows = rows.len(), output = %previous.display(), "Resuming from existing output");
                    output = rows;
                    resumed = true;
                }
                Ok(rows) => warn!(
                    expected = source.len(),
                    found = rows.len(),
                    output = %previous.display(),
                    "Existing output has a different row count, starting over"
                ),
                Err(e) => warn!(error = %e, output = %previous.display(), "Existing output is unreadable, starting over"),
            }
        }

        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            options: options.clone(),
            source,
            output,
            resumed,
        })
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.output
    }

    fn source_text(&self, row: usize) -> Option<&str> {
        self.source
            .get(row)
            .and_then(|r| r.get(self.options.translate_col))
            .map(String::as_str)
    }

    fn already_translated(&self, row: usize) -> bool {
        if !self.resumed {
            return false;
        }
        let Some(cell) = self.output.get(row).and_then(|r| r.get(self.options.output_col)) else {
            return false;
        };
        !cell.trim().is_empty()
            && (self.options.output_col != self.options.translate_col
                || Some(cell.as_str()) != self.source_text(row))
    }
}

impl Document for CsvDocument {
    /// Row index, header included.
    type Location = usize;

    fn texts(&self) -> Vec<String> {
        (1..self.source.len())
            .filter_map(|row| self.source_text(row))
            .filter(|text| is_translatable(text))
            .map(str::to_string)
            .collect()
    }

    fn units(&self) -> Vec<Unit<usize>> {
        (1..self.source.len())
            .filter(|row| !self.already_translated(*row))
            .filter_map(|row| {
                let text = self.source_text(row).filter(|t| is_translatable(t))?;
                Some(Unit {
                    location: row,
                    text: text.to_string(),
                    entry_context: None,
                    label: format!("CSV '{}' | Row {}", self.name, row + 1),
                })
            })
            .collect()
    }

    fn apply(&mut self, unit: &Unit<usize>, translated: &str) {
        let column = self.options.output_col;
        if let Some(row) = self.output.get_mut(unit.location) {
            if row.len() <= column {
                row.resize(column + 1, String::new());
            }
            row[column] = translated.to_string();
        }
    }

    fn write(&self, path: &Path) -> Result<()> {
        let mut writer = WriterBuilder::new()
            .delimiter(self.options.delimiter)
            .flexible(true)
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::CRLF)
            .from_path(path)?;
        for row in &self.output {
            writer.write_record(row)?;
        }
        writer
            .flush()
            .map_err(|e| AppError::io(format!("write {}", path.display()), &e))
    }
}
