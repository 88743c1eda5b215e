//! Turn chunk artifacts into an aligned vector index

use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use super::index::FlatIndex;
use super::store::IndexStore;
use crate::config::{ChunkingConfig, EmbeddingConfig};
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::types::{Chunk, ChunkRecord, ChunkType};

/// Collects indexable chunks and embeds them
#[derive(Debug, Clone)]
pub struct Indexer {
    min_chunk_words: usize,
    batch_size: usize,
}

impl Indexer {
    /// Create an indexer with explicit thresholds
    pub fn new(min_chunk_words: usize, batch_size: usize) -> Self {
        Self {
            min_chunk_words,
            batch_size: batch_size.max(1),
        }
    }

    /// Indexer using the chunking word floor and the embedding batch size
    pub fn from_config(chunking: &ChunkingConfig, embeddings: &EmbeddingConfig) -> Self {
        Self::new(chunking.min_chunk_words, embeddings.batch_size)
    }

    /// Read every `{company}/*.json` under `chunks_dir` in sorted order
    ///
    /// Info chunks and chunks under the word floor are skipped. Unreadable
    /// files are logged and skipped.
    pub fn collect(&self, chunks_dir: &Path) -> Result<Vec<ChunkRecord>> {
        if !chunks_dir.is_dir() {
            return Err(Error::Config(format!(
                "{} is not a directory",
                chunks_dir.display()
            )));
        }

        let mut records = Vec::new();
        let mut files = 0;
        for entry in WalkDir::new(chunks_dir)
            .min_depth(2)
            .max_depth(2)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let company = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let filename = entry.file_name().to_string_lossy().to_string();

            let chunks: Vec<Chunk> = match std::fs::read(path)
                .map_err(Error::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(Error::from))
            {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };

            files += 1;
            records.extend(
                chunks
                    .into_iter()
                    .filter(|c| c.chunk_type != ChunkType::Info)
                    .filter(|c| c.word_count() >= self.min_chunk_words)
                    .map(|c| ChunkRecord::new(c, company.clone(), filename.clone())),
            );
        }

        info!(
            "Collected {} chunks from {} files in {}",
            records.len(),
            files,
            chunks_dir.display()
        );
        Ok(records)
    }

    /// Embed `records` in batches; `progress` receives the running count
    pub async fn build<F>(
        &self,
        records: Vec<ChunkRecord>,
        embedder: &dyn EmbeddingProvider,
        progress: F,
    ) -> Result<IndexStore>
    where
        F: Fn(usize),
    {
        let mut index = FlatIndex::new(embedder.dimensions());
        info!(
            "Embedding {} chunks with {} ({} dims)",
            records.len(),
            embedder.name(),
            embedder.dimensions()
        );

        for batch in records.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|r| r.chunk.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "Expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (record, vector) in batch.iter().zip(&vectors) {
                index.add(record.key(), vector)?;
            }
            progress(index.len());
        }

        IndexStore::new(index, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "length"
        }
    }

    fn chunk(id: u32, chunk_type: ChunkType, text: &str) -> Chunk {
        Chunk {
            chunk_id: id,
            text: text.to_string(),
            section: None,
            subheading: None,
            chunk_type,
            start: 0,
            end: text.chars().count(),
            company: "ignored".to_string(),
            year: Some(2021),
        }
    }

    fn write_chunks(dir: &Path, company: &str, file: &str, chunks: &[Chunk]) {
        let company_dir = dir.join(company);
        std::fs::create_dir_all(&company_dir).unwrap();
        std::fs::write(
            company_dir.join(file),
            serde_json::to_string_pretty(chunks).unwrap(),
        )
        .unwrap();
    }

    const LONG: &str = "Revenue increased primarily due to higher iPhone and services sales";

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_chunks(
            dir.path(),
            "MSFT",
            "MSFT_2021_chunks.json",
            &[
                chunk(1, ChunkType::Info, "Company: MSFT, Year: 2021"),
                chunk(2, ChunkType::Section, LONG),
            ],
        );
        write_chunks(
            dir.path(),
            "AAPL",
            "AAPL_2021_chunks.json",
            &[
                chunk(1, ChunkType::Info, "Company: AAPL, Year: 2021"),
                chunk(2, ChunkType::Paragraph, "Too short"),
                chunk(3, ChunkType::Table, LONG),
                chunk(4, ChunkType::Paragraph, LONG),
            ],
        );
        std::fs::write(dir.path().join("AAPL").join("broken.json"), "{not json").unwrap();
        dir
    }

    #[test]
    fn collect_skips_info_short_and_broken() {
        let dir = fixture();
        let records = Indexer::new(8, 4).collect(dir.path()).unwrap();

        let keys: Vec<(String, u32)> = records
            .iter()
            .map(|r| (r.filename.clone(), r.chunk.chunk_id))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("AAPL_2021_chunks.json".to_string(), 3),
                ("AAPL_2021_chunks.json".to_string(), 4),
                ("MSFT_2021_chunks.json".to_string(), 2),
            ]
        );
        assert!(records.iter().all(|r| r.chunk.company != "ignored"));
    }

    #[test]
    fn collect_requires_directory() {
        let err = Indexer::new(8, 4)
            .collect(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn build_aligns_rows_and_reports_progress() {
        let dir = fixture();
        let indexer = Indexer::new(8, 2);
        let records = indexer.collect(dir.path()).unwrap();

        let seen = AtomicUsize::new(0);
        let store = indexer
            .build(records, &LengthEmbedder, |n| seen.store(n, Ordering::SeqCst))
            .await
            .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        for (key, record) in store.index().keys().iter().zip(store.records()) {
            assert_eq!(*key, record.key());
        }
    }
}
