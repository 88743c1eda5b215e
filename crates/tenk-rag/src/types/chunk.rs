//! Chunk and metadata types with provenance for citations

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Year not embedded in a longer digit run (accession numbers contain `20xx` too)
static ISOLATED_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])(20\d{2})(?:[^0-9]|$)").expect("Invalid regex"));
static ANY_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"20\d{2}").expect("Invalid regex"));

/// Label attached to every chunk
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Synthetic leading chunk carrying company/year
    Info,
    /// Prose directly under a top-level PART/ITEM heading
    Section,
    /// Prose under a sub-heading, or outside any section
    Paragraph,
    /// Consecutive table-like lines
    Table,
}

/// Where a filing came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRef {
    /// Ticker, taken from the containing directory
    pub company: String,
    /// Source document file name
    pub filename: String,
    /// Filing year parsed from the file name
    pub year: Option<u16>,
}

impl FilingRef {
    /// Build provenance for a file name, parsing the year from it
    pub fn new(company: impl Into<String>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let year = parse_year(&filename);
        Self {
            company: company.into(),
            filename,
            year,
        }
    }

    /// Provenance for `{company}/{file}` paths
    pub fn from_path(path: &Path) -> Self {
        let company = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::new(company, filename)
    }
}

/// Parse a filing year (`20xx`) from a file name
pub fn parse_year(name: &str) -> Option<u16> {
    ISOLATED_YEAR
        .captures(name)
        .and_then(|cap| cap.get(1))
        .or_else(|| ANY_YEAR.find(name))
        .and_then(|m| m.as_str().parse().ok())
}

/// A labeled span of a filing's text, the unit of retrieval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Position within the filing, starting at 1
    pub chunk_id: u32,
    /// Normalized content
    pub text: String,
    /// Most recent PART/ITEM heading
    pub section: Option<String>,
    /// Most recent sub-heading under `section`
    pub subheading: Option<String>,
    /// Chunk label
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    /// Char offset into the joined chunk stream
    pub start: usize,
    /// Exclusive end offset
    pub end: usize,
    /// Ticker
    pub company: String,
    /// Filing year
    pub year: Option<u16>,
}

impl Chunk {
    /// Whitespace-separated token count
    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Whitespace-separated token count
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Persistent identifier of an indexed chunk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    /// Chunk artifact file name
    pub filename: String,
    /// Chunk id within that file
    pub chunk_id: u32,
}

/// Metadata stored alongside each embedding, in index order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// Chunk fields (company re-derived from the directory)
    #[serde(flatten)]
    pub chunk: Chunk,
    /// Chunk artifact the record was read from
    pub filename: String,
}

impl ChunkRecord {
    /// Create a record, overriding the chunk's company with the directory name
    pub fn new(mut chunk: Chunk, company: impl Into<String>, filename: impl Into<String>) -> Self {
        chunk.company = company.into();
        Self {
            chunk,
            filename: filename.into(),
        }
    }

    /// Key stored next to the vector for this record
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            filename: self.filename.clone(),
            chunk_id: self.chunk.chunk_id,
        }
    }

    /// Year for display
    pub fn year_label(&self) -> String {
        self.chunk
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Source citation `COMPANY YEAR - filename`
    pub fn format_citation(&self) -> String {
        format!(
            "{} {} - {}",
            self.chunk.company,
            self.year_label(),
            self.filename
        )
    }
}
