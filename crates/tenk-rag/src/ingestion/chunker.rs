//! Section-aware chunking of normalized filing text

use std::path::Path;

use tracing::debug;

use super::classifier::{self, LineKind};
use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::{Chunk, ChunkType, FilingRef};

/// State machine that turns a filing's lines into labeled chunks
///
/// Top-level `PART`/`ITEM` headings open a section, sub-headings refine it,
/// runs of table rows become one table chunk and everything else accumulates
/// into a paragraph buffer.
#[derive(Debug, Clone, Default)]
pub struct SectionChunker {
    config: ChunkingConfig,
}

impl SectionChunker {
    /// Create a new chunker
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunk a text file, taking the year from its file name
    pub fn chunk_file(&self, path: &Path, company: &str) -> Result<Vec<Chunk>> {
        let text = std::fs::read_to_string(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let filing = FilingRef::new(company, filename);
        Ok(self.chunk(&text, &filing))
    }

    /// Chunk normalized text
    pub fn chunk(&self, text: &str, filing: &FilingRef) -> Vec<Chunk> {
        let mut sink = ChunkSink::new(filing, self.config.min_chunk_words);
        sink.push_info();

        let mut section: Option<String> = None;
        let mut subheading: Option<String> = None;
        let mut paragraph = ParagraphBuffer::default();

        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            match classifier::classify(line) {
                LineKind::Blank => {
                    if paragraph.char_len() > self.config.max_chunk_chars {
                        paragraph.flush(&mut sink, &section, &subheading);
                    }
                }
                LineKind::Noise => {}
                LineKind::Heading => {
                    paragraph.flush(&mut sink, &section, &subheading);
                    section = Some(classifier::heading_text(line).to_string());
                    subheading = None;
                }
                LineKind::SubHeading => {
                    paragraph.flush(&mut sink, &section, &subheading);
                    subheading = Some(classifier::heading_text(line).to_string());
                }
                LineKind::TableRow => {
                    paragraph.flush(&mut sink, &section, &subheading);
                    let mut rows = vec![line];
                    // Rule lines between rows do not end the table
                    while let Some(&next) = lines.get(i + 1) {
                        match classifier::classify(next) {
                            LineKind::TableRow => rows.push(next),
                            LineKind::Noise => {}
                            _ => break,
                        }
                        i += 1;
                    }
                    sink.emit(
                        rows.join("\n"),
                        ChunkType::Table,
                        section.clone(),
                        subheading.clone(),
                    );
                }
                LineKind::Prose => paragraph.push(line),
            }
            i += 1;
        }
        paragraph.flush(&mut sink, &section, &subheading);

        debug!(
            company = %filing.company,
            file = %filing.filename,
            chunks = sink.chunks.len(),
            "Chunked filing"
        );
        sink.chunks
    }
}

/// Accumulated prose lines awaiting a flush
#[derive(Debug, Default)]
struct ParagraphBuffer {
    lines: Vec<String>,
}

impl ParagraphBuffer {
    fn push(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    /// Char length of the buffer as it would be emitted
    fn char_len(&self) -> usize {
        let chars: usize = self.lines.iter().map(|l| l.chars().count()).sum();
        chars + self.lines.len().saturating_sub(1)
    }

    fn flush(
        &mut self,
        sink: &mut ChunkSink<'_>,
        section: &Option<String>,
        subheading: &Option<String>,
    ) {
        if self.lines.is_empty() {
            return;
        }
        let text = self.lines.join("\n");
        self.lines.clear();
        let chunk_type = if section.is_some() && subheading.is_none() {
            ChunkType::Section
        } else {
            ChunkType::Paragraph
        };
        sink.emit(text, chunk_type, section.clone(), subheading.clone());
    }
}

/// Applies the word minimum, assigns ids and offsets
struct ChunkSink<'a> {
    filing: &'a FilingRef,
    min_words: usize,
    chunks: Vec<Chunk>,
    /// Offset where the next emitted chunk starts
    offset: usize,
}

impl<'a> ChunkSink<'a> {
    fn new(filing: &'a FilingRef, min_words: usize) -> Self {
        Self {
            filing,
            min_words,
            chunks: Vec::new(),
            offset: 0,
        }
    }

    fn push_info(&mut self) {
        let year = self
            .filing
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let text = format!("Company: {}, Year: {}", self.filing.company, year);
        self.append(text, ChunkType::Info, None, None);
    }

    fn emit(
        &mut self,
        text: String,
        chunk_type: ChunkType,
        section: Option<String>,
        subheading: Option<String>,
    ) {
        if crate::types::chunk::word_count(&text) < self.min_words {
            return;
        }
        self.append(text, chunk_type, section, subheading);
    }

    fn append(
        &mut self,
        text: String,
        chunk_type: ChunkType,
        section: Option<String>,
        subheading: Option<String>,
    ) {
        let start = self.offset;
        let end = start + text.chars().count();
        // One separator char between consecutive chunks
        self.offset = end + 1;
        self.chunks.push(Chunk {
            chunk_id: self.chunks.len() as u32 + 1,
            text,
            section,
            subheading,
            chunk_type,
            start,
            end,
            company: self.filing.company.clone(),
            year: self.filing.year,
        });
    }
}
