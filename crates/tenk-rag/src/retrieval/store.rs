//! Vector index plus its ordered metadata, kept in lock-step

use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;

use super::index::FlatIndex;
use crate::error::{Error, Result};
use crate::types::ChunkRecord;

/// Index and metadata whose rows are known to line up
#[derive(Debug, Clone)]
pub struct IndexStore {
    index: FlatIndex,
    records: Vec<ChunkRecord>,
}

impl IndexStore {
    /// Pair an index with its metadata, verifying row-by-row alignment
    pub fn new(index: FlatIndex, records: Vec<ChunkRecord>) -> Result<Self> {
        verify_alignment(&index, &records)?;
        Ok(Self { index, records })
    }

    /// Write both artifacts; the index header records the metadata digest
    pub fn save(&self, index_path: &Path, metadata_path: &Path) -> Result<()> {
        let metadata = serde_json::to_vec_pretty(&self.records)?;
        if let Some(parent) = metadata_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(metadata_path, &metadata)?;
        self.index.save(index_path, &digest(&metadata))?;

        tracing::info!(
            "Saved {} vectors to {} and metadata to {}",
            self.index.len(),
            index_path.display(),
            metadata_path.display()
        );
        Ok(())
    }

    /// Load both artifacts and refuse to serve them if they disagree
    pub fn open(index_path: &Path, metadata_path: &Path) -> Result<Self> {
        let metadata = std::fs::read(metadata_path)?;
        let (index, expected_digest) = FlatIndex::load(index_path)?;

        let actual_digest = digest(&metadata);
        if actual_digest != expected_digest {
            return Err(Error::IndexMismatch(format!(
                "{} changed since {} was built",
                metadata_path.display(),
                index_path.display()
            )));
        }

        let records: Vec<ChunkRecord> = serde_json::from_slice(&metadata)?;
        let store = Self::new(index, records)?;
        tracing::info!("Loaded index with {} chunks", store.len());
        Ok(store)
    }

    /// Underlying vector index
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    /// Metadata in row order
    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Metadata for row `position`
    pub fn record(&self, position: usize) -> Option<&ChunkRecord> {
        self.records.get(position)
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct companies, sorted
    pub fn companies(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.chunk.company.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn verify_alignment(index: &FlatIndex, records: &[ChunkRecord]) -> Result<()> {
    if index.len() != records.len() {
        return Err(Error::IndexMismatch(format!(
            "index has {} vectors but metadata has {} records",
            index.len(),
            records.len()
        )));
    }
    for (position, (key, record)) in index.keys().iter().zip(records).enumerate() {
        if *key != record.key() {
            return Err(Error::IndexMismatch(format!(
                "row {} is {}#{} in the index but {}#{} in the metadata",
                position, key.filename, key.chunk_id, record.filename, record.chunk.chunk_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkType};

    fn record(company: &str, id: u32) -> ChunkRecord {
        let chunk = Chunk {
            chunk_id: id,
            text: format!("chunk {} text", id),
            section: None,
            subheading: None,
            chunk_type: ChunkType::Paragraph,
            start: 0,
            end: 10,
            company: company.to_string(),
            year: Some(2022),
        };
        ChunkRecord::new(chunk, company, format!("{}_2022_chunks.json", company))
    }

    fn store() -> IndexStore {
        let records = vec![record("AAPL", 2), record("MSFT", 2), record("AAPL", 3)];
        let mut index = FlatIndex::new(2);
        for (i, r) in records.iter().enumerate() {
            index.add(r.key(), &[i as f32, 0.0]).unwrap();
        }
        IndexStore::new(index, records).unwrap()
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut index = FlatIndex::new(1);
        index.add(record("AAPL", 2).key(), &[0.0]).unwrap();
        let err = IndexStore::new(index, vec![]).unwrap_err();
        assert!(matches!(err, Error::IndexMismatch(_)));
    }

    #[test]
    fn rejects_key_mismatch() {
        let mut index = FlatIndex::new(1);
        index.add(record("AAPL", 2).key(), &[0.0]).unwrap();
        let err = IndexStore::new(index, vec![record("AAPL", 3)]).unwrap_err();
        assert!(matches!(err, Error::IndexMismatch(_)));
    }

    #[test]
    fn save_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("chunks.idx");
        let metadata_path = dir.path().join("chunk_metadata.json");

        let saved = store();
        saved.save(&index_path, &metadata_path).unwrap();
        let opened = IndexStore::open(&index_path, &metadata_path).unwrap();

        assert_eq!(opened.len(), 3);
        assert_eq!(opened.records(), saved.records());
        assert_eq!(opened.companies(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn edited_metadata_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("chunks.idx");
        let metadata_path = dir.path().join("chunk_metadata.json");
        store().save(&index_path, &metadata_path).unwrap();

        let mut records: Vec<ChunkRecord> =
            serde_json::from_slice(&std::fs::read(&metadata_path).unwrap()).unwrap();
        records.swap(0, 2);
        std::fs::write(&metadata_path, serde_json::to_vec_pretty(&records).unwrap()).unwrap();

        let err = IndexStore::open(&index_path, &metadata_path).unwrap_err();
        assert!(matches!(err, Error::IndexMismatch(_)));
    }
}
