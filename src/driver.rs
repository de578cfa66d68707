// src/driver.rs

//! Walks the input tree and runs every matching file through its walker and
//! the translation pipeline.

use crate::cache::PERIODIC_SAVE_INTERVAL;
use crate::config::FileType;
use crate::error::{AppError, Halt, Result};
use crate::pipeline::{self, FILE_CONTEXT_SAMPLE_SIZE};
use crate::state::{FileProgress, RunContext};
use crate::walkers::{write_translations, CsvDocument, Document, JsonDocument, PoDocument, Unit};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};
use walkdir::WalkDir;

/// What happened to one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Every unit went through the pipeline and the output was written.
    Completed,
    /// A skip request ended the file early; partial output was written.
    Interrupted,
    /// Nothing was written, e.g. the file exceeds the max-entries limit.
    Skipped,
}

impl FileOutcome {
    fn wrote_output(self) -> bool {
        matches!(self, Self::Completed | Self::Interrupted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub output_root: PathBuf,
    pub files_found: usize,
    pub files_written: usize,
    pub stopped_early: bool,
}

/// `<parent>/translated` for a directory named `input`, `<input>_translated`
/// otherwise.
pub fn output_root(input: &Path) -> Result<PathBuf> {
    let input = input
        .canonicalize()
        .map_err(|_| AppError::InputNotFound {
            path: input.display().to_string(),
        })?;
    if input.file_name().is_some_and(|name| name == "input") {
        let parent = input.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        return Ok(parent.join("translated"));
    }
    let mut name = input.into_os_string();
    name.push("_translated");
    Ok(PathBuf::from(name))
}

/// Files under `root` with the extension of `file_type`, in a stable order.
pub fn discover_files(root: &Path, file_type: FileType) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Unreadable directory entry skipped");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == file_type.extension()))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Mirrors `file` from `input_root` into `output_root`.
pub fn output_path(input_root: &Path, output_root: &Path, file: &Path, translation_only: bool) -> PathBuf {
    let relative_dir = file
        .parent()
        .and_then(|dir| dir.strip_prefix(input_root).ok())
        .unwrap_or_else(|| Path::new(""));
    let dir = output_root.join(relative_dir);
    if translation_only {
        let stem = file.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        dir.join(format!("{stem}_translations.txt"))
    } else {
        dir.join(file.file_name().unwrap_or_default())
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Processes every file of the input tree.
///
/// Only run-fatal conditions are returned as errors; a failing file is logged
/// and the run moves on.
#[instrument(skip_all, fields(input = %ctx.settings.input.display(), file_type = %ctx.file_type()))]
pub async fn run(ctx: &RunContext) -> Result<RunReport> {
    let settings = &ctx.settings;
    let input_root = settings
        .input
        .canonicalize()
        .map_err(|_| AppError::InputNotFound {
            path: settings.input.display().to_string(),
        })?;
    let output_root = output_root(&input_root)?;
    fs::create_dir_all(&output_root).map_err(|e| AppError::io(format!("create {}", output_root.display()), &e))?;

    let files = discover_files(&input_root, settings.file_type);
    info!(
        files = files.len(),
        output = %output_root.display(),
        "Scanned input directory"
    );
    let mut report = RunReport {
        output_root: output_root.clone(),
        files_found: files.len(),
        files_written: 0,
        stopped_early: false,
    };
    if files.is_empty() {
        warn!(extension = settings.file_type.extension(), "No matching files found");
        return Ok(report);
    }

    let translation_only = settings.translation_only_output && settings.file_type != FileType::Po;
    if settings.translation_only_output && !translation_only {
        warn!("--translation-only-output is not supported for PO files, writing full catalogs");
    }

    for (index, input) in files.iter().enumerate() {
        let name = display_name(input);
        if ctx.stop_requested() {
            info!("Stop requested, ending the run");
            report.stopped_early = true;
            break;
        }
        if ctx.skip_file_requested() {
            info!(file = %name, "Skip requested, file not started");
            ctx.clear_skip_file();
            continue;
        }

        ctx.pause.wait_if_paused(&format!("start of {name}")).await;
        info!(file = %name, position = index + 1, total = files.len(), "Processing file");

        let output = output_path(&input_root, &output_root, input, translation_only);
        if settings.resume && settings.file_type != FileType::Csv && output.exists() {
            warn!(output = %output.display(), "Resume is only supported for CSV, the existing output will be overwritten");
        }

        {
            let mut flags = ctx.flags();
            flags.progress = FileProgress {
                name: Some(name.clone()),
                total: 0,
                processed: 0,
            };
            flags.file_context = None;
        }

        let outcome = match output.parent().map(fs::create_dir_all).transpose() {
            Ok(_) => process_file(ctx, input, &output, translation_only).await,
            Err(e) => Err(Halt::Fatal(AppError::io(format!("create {}", output.display()), &e))),
        };

        match outcome {
            Ok(outcome) if outcome.wrote_output() => {
                report.files_written += 1;
                ctx.counters.record_file();
                if outcome == FileOutcome::Interrupted {
                    info!(file = %name, output = %output.display(), "File skipped on request, partial output saved");
                } else {
                    info!(file = %name, output = %output.display(), "File completed");
                }
                ctx.notify(&format!("✅ *File completed!*\n`{name}` has been translated and saved."));
            }
            Ok(_) => {}
            Err(Halt::Fatal(e)) if e.is_run_fatal() => {
                error!(file = %name, error = %e, "Run-fatal error, stopping");
                ctx.flags().progress = FileProgress::default();
                return Err(e);
            }
            Err(Halt::Fatal(e)) => {
                error!(file = %name, error = %e, "File failed and was skipped");
            }
            Err(Halt::SkipFile) => {
                info!(file = %name, "File skipped on request");
            }
        }

        if let Err(e) = ctx.cache.save_if_due(PERIODIC_SAVE_INTERVAL) {
            warn!(error = %e, "Periodic cache save failed");
        }
        ctx.clear_skip_file();
        ctx.flags().progress = FileProgress::default();
    }

    Ok(report)
}

async fn process_file(
    ctx: &RunContext,
    input: &Path,
    output: &Path,
    translation_only: bool,
) -> std::result::Result<FileOutcome, Halt> {
    let name = display_name(input);
    let settings = &ctx.settings;
    match settings.file_type {
        FileType::Csv => {
            let resume_from = settings.resume.then_some(output);
            let mut doc = CsvDocument::load(input, &settings.csv, resume_from)?;
            translate_document(ctx, &mut doc, &name, output, translation_only).await
        }
        FileType::Json => {
            let mut doc = JsonDocument::load(input, &settings.json)?;
            translate_document(ctx, &mut doc, &name, output, translation_only).await
        }
        FileType::Po => {
            let mut doc = PoDocument::load(input)?;
            translate_document(ctx, &mut doc, &name, output, false).await
        }
    }
}

/// Runs the units of `doc` through the pipeline and always writes what was
/// translated, even when the work ends early.
async fn translate_document<D: Document>(
    ctx: &RunContext,
    doc: &mut D,
    name: &str,
    output: &Path,
    translation_only: bool,
) -> std::result::Result<FileOutcome, Halt> {
    let units = doc.units();
    let limit = ctx.flags().max_entries;
    if let Some(limit) = limit.filter(|limit| units.len() > *limit) {
        warn!(file = %name, entries = units.len(), limit, "File exceeds the max entries limit, skipped");
        return Ok(FileOutcome::Skipped);
    }
    ctx.flags().progress.total = units.len();

    let mut translations = Vec::with_capacity(units.len());
    let result = translate_units(ctx, doc, name, &units, &mut translations).await;

    let written = if translation_only {
        write_translations(output, &translations)
    } else {
        doc.write(output)
    };
    if let Err(e) = &written {
        error!(file = %name, output = %output.display(), error = %e, "Output could not be written");
    }

    match (result, written) {
        (Err(Halt::Fatal(e)), _) | (_, Err(e)) => Err(Halt::Fatal(e)),
        (Err(Halt::SkipFile), Ok(())) => Ok(FileOutcome::Interrupted),
        (Ok(()), Ok(())) => Ok(FileOutcome::Completed),
    }
}

async fn translate_units<D: Document>(
    ctx: &RunContext,
    doc: &mut D,
    name: &str,
    units: &[Unit<D::Location>],
    translations: &mut Vec<String>,
) -> std::result::Result<(), Halt> {
    if ctx.settings.enable_file_context && !units.is_empty() {
        let texts = doc.texts();
        if pipeline::all_cached(ctx, texts.iter().map(String::as_str)) {
            info!(file = %name, "Every translation is cached, file context not needed");
        } else {
            let limit = (!ctx.settings.full_context_sample).then_some(FILE_CONTEXT_SAMPLE_SIZE);
            let sample = doc.sample(limit);
            let context = pipeline::file_context(ctx, name, &sample).await?;
            ctx.flags().file_context = context;
        }
    }
    let file_context = ctx.flags().file_context.clone();

    for unit in units {
        if ctx.skip_file_requested() {
            return Err(Halt::SkipFile);
        }
        let dynamic = doc.dynamic_context(file_context.as_deref(), unit);
        let translated = pipeline::translate(ctx, &unit.text, &unit.label, dynamic.as_deref()).await?;
        doc.apply(unit, &translated);
        translations.push(translated);
        ctx.counters.record_entry();
        ctx.flags().progress.processed += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_root_naming() {
        let dir = TempDir::new().unwrap();
        let named_input = dir.path().join("input");
        let other = dir.path().join("texts");
        fs::create_dir_all(&named_input).unwrap();
        fs::create_dir_all(&other).unwrap();

        let base = dir.path().canonicalize().unwrap();
        assert_eq!(output_root(&named_input).unwrap(), base.join("translated"));
        assert_eq!(output_root(&other).unwrap(), base.join("texts_translated"));
    }

    #[test]
    fn test_discover_files_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.csv"), "").unwrap();
        fs::write(dir.path().join("a.csv"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("sub").join("c.csv"), "").unwrap();

        let files: Vec<String> = discover_files(dir.path(), FileType::Csv)
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(files, vec!["a.csv", "b.csv", format!("sub{}c.csv", std::path::MAIN_SEPARATOR).as_str()]);
    }

    #[test]
    fn test_output_path_mirrors_tree() {
        let input = Path::new("/data/input");
        let out = Path::new("/data/translated");
        let file = Path::new("/data/input/menus/main.json");
        assert_eq!(output_path(input, out, file, false), Path::new("/data/translated/menus/main.json"));
        assert_eq!(
            output_path(input, out, file, true),
            Path::new("/data/translated/menus/main_translations.txt")
        );
    }
}
