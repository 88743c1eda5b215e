//! Directory-to-directory batch conversion and chunking
//!
//! Both stages read a `{company}/{document}` layout, process filings in
//! parallel and isolate failures per file: a bad filing is logged and
//! counted, the batch carries on.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::chunker::SectionChunker;
use super::normalizer::FilingNormalizer;
use crate::error::{Error, Result};

static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\-]").expect("Invalid regex"));

/// Outcome of one batch stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Files written successfully
    pub processed: usize,
    /// Files that failed and were skipped
    pub failed: usize,
    /// Output paths, sorted
    pub outputs: Vec<PathBuf>,
}

/// A source file plus the company directory it sits in
#[derive(Debug, Clone)]
struct SourceFile {
    company: String,
    path: PathBuf,
}

/// Convert every `{company}/*.htm(l)` under `raw_dir` into `{txt_dir}/{company}/*.txt`
pub fn convert_dir(
    raw_dir: &Path,
    txt_dir: &Path,
    normalizer: &FilingNormalizer,
) -> Result<BatchReport> {
    let files = discover(raw_dir, &["htm", "html"])?;
    info!(
        "Converting {} filings from {} with {} threads",
        files.len(),
        raw_dir.display(),
        rayon::current_num_threads()
    );

    let results: Vec<(&SourceFile, Result<PathBuf>)> = files
        .par_iter()
        .map(|file| (file, convert_file(file, txt_dir, normalizer)))
        .collect();

    Ok(tally("convert", results))
}

/// Chunk every `{company}/*.txt` under `txt_dir` into `{output_dir}/{company}/*_chunks.json`
pub fn chunk_dir(
    txt_dir: &Path,
    output_dir: &Path,
    chunker: &SectionChunker,
) -> Result<BatchReport> {
    let files = discover(txt_dir, &["txt"])?;
    info!("Chunking {} text files from {}", files.len(), txt_dir.display());

    let results: Vec<(&SourceFile, Result<PathBuf>)> = files
        .par_iter()
        .map(|file| (file, chunk_file(file, output_dir, chunker)))
        .collect();

    Ok(tally("chunk", results))
}

/// Replace anything outside `[A-Za-z0-9_-]` in a file stem with `_`
pub fn sanitize_stem(stem: &str) -> String {
    UNSAFE_FILENAME_CHARS.replace_all(stem, "_").into_owned()
}

fn convert_file(file: &SourceFile, txt_dir: &Path, normalizer: &FilingNormalizer) -> Result<PathBuf> {
    let filename = file_name(&file.path);
    let data = std::fs::read(&file.path)?;
    let text = normalizer.normalize_bytes(&filename, &data)?;

    let out_dir = txt_dir.join(&file.company);
    std::fs::create_dir_all(&out_dir)?;
    let out_path = out_dir.join(format!("{}.txt", sanitize_stem(&file_stem(&file.path))));
    std::fs::write(&out_path, text)?;

    info!("Converted {} -> {}", filename, out_path.display());
    Ok(out_path)
}

fn chunk_file(file: &SourceFile, output_dir: &Path, chunker: &SectionChunker) -> Result<PathBuf> {
    let chunks = chunker.chunk_file(&file.path, &file.company)?;

    let out_dir = output_dir.join(&file.company);
    std::fs::create_dir_all(&out_dir)?;
    let out_path = out_dir.join(format!("{}_chunks.json", file_stem(&file.path)));
    std::fs::write(&out_path, serde_json::to_string_pretty(&chunks)?)?;

    info!(
        "Chunked {} -> {} ({} chunks)",
        file.path.display(),
        out_path.display(),
        chunks.len()
    );
    Ok(out_path)
}

fn tally(stage: &str, results: Vec<(&SourceFile, Result<PathBuf>)>) -> BatchReport {
    let mut report = BatchReport::default();
    for (file, result) in results {
        match result {
            Ok(path) => {
                report.processed += 1;
                report.outputs.push(path);
            }
            Err(e) => {
                warn!("Failed to {} {}: {}", stage, file.path.display(), e);
                report.failed += 1;
            }
        }
    }
    report.outputs.sort();
    info!(
        "{}: {} processed, {} failed",
        stage, report.processed, report.failed
    );
    report
}

/// Files exactly one directory below `root` with one of `extensions`, sorted
fn discover(root: &Path, extensions: &[&str]) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        let matches_ext = path
            .extension()
            .map(|e| {
                let ext = e.to_string_lossy().to_lowercase();
                extensions.contains(&ext.as_str())
            })
            .unwrap_or(false);
        if !path.is_file() || !matches_ext {
            continue;
        }
        let company = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        files.push(SourceFile {
            company,
            path: path.to_path_buf(),
        });
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
