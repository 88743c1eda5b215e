//! Exact nearest-neighbour index under squared Euclidean distance
//!
//! Vectors live in one contiguous row-major buffer. Every row carries the
//! [`ChunkKey`] of the chunk it embeds so metadata alignment can be checked
//! instead of assumed.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ChunkKey;

const INDEX_MAGIC: [u8; 8] = *b"TENKFLAT";
const INDEX_VERSION: u32 = 1;

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Row position (insertion order)
    pub position: usize,
    /// Squared L2 distance to the query
    pub distance: f32,
}

/// Brute-force L2 index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimensions: usize,
    keys: Vec<ChunkKey>,
    vectors: Vec<f32>,
}

/// On-disk layout
#[derive(Serialize, Deserialize)]
struct IndexFile {
    magic: [u8; 8],
    version: u32,
    /// sha256 of the metadata artifact written alongside
    metadata_digest: String,
    index: FlatIndex,
}

impl FlatIndex {
    /// Create an empty index
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            keys: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Vector dimensionality
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when nothing has been added
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in row order
    pub fn keys(&self) -> &[ChunkKey] {
        &self.keys
    }

    /// Vector stored at `position`
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.vectors.get(start..start + self.dimensions)
    }

    /// Append one row
    pub fn add(&mut self, key: ChunkKey, vector: &[f32]) -> Result<()> {
        self.check_dimensions(vector)?;
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::index(format!(
                "Non-finite embedding for {}#{}",
                key.filename, key.chunk_id
            )));
        }
        self.keys.push(key);
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    /// The `k` nearest rows, closest first; equal distances keep insertion order
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimensions(query)?;
        if self.dimensions == 0 {
            return Err(Error::index("Index has zero dimensions"));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .par_chunks_exact(self.dimensions)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: euclidean_distance_squared(query, row),
            })
            .collect();

        // Stable sort: ties stay in row order
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::index(format!(
                "Expected {} dimensions, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        Ok(())
    }

    /// Serialize to `path` together with the digest of its metadata
    pub fn save(&self, path: &Path, metadata_digest: &str) -> Result<()> {
        let file = IndexFile {
            magic: INDEX_MAGIC,
            version: INDEX_VERSION,
            metadata_digest: metadata_digest.to_string(),
            index: self.clone(),
        };
        let bytes = bincode::serde::encode_to_vec(&file, bincode::config::standard())
            .map_err(|e| Error::index(format!("Failed to encode index: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load an index and the metadata digest it was saved with
    pub fn load(path: &Path) -> Result<(Self, String)> {
        let bytes = std::fs::read(path)?;
        let (file, _): (IndexFile, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(|e| Error::index(format!("Failed to decode {}: {}", path.display(), e)))?;

        if file.magic != INDEX_MAGIC {
            return Err(Error::index(format!("{} is not an index file", path.display())));
        }
        if file.version != INDEX_VERSION {
            return Err(Error::index(format!(
                "Unsupported index version {} in {}",
                file.version,
                path.display()
            )));
        }
        let index = file.index;
        if index.vectors.len() != index.keys.len() * index.dimensions {
            return Err(Error::index(format!(
                "Corrupt index {}: {} values for {} rows of {} dimensions",
                path.display(),
                index.vectors.len(),
                index.keys.len(),
                index.dimensions
            )));
        }
        Ok((index, file.metadata_digest))
    }
}

/// Squared Euclidean distance, unrolled by four
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let mut sum = 0.0;
    let mut i = 0;

    while i + 3 < n {
        let d0 = a[i] - b[i];
        let d1 = a[i + 1] - b[i + 1];
        let d2 = a[i + 2] - b[i + 2];
        let d3 = a[i + 3] - b[i + 3];
        sum += d0 * d0 + d1 * d1 + d2 * d2 + d3 * d3;
        i += 4;
    }

    while i < n {
        let d = a[i] - b[i];
        sum += d * d;
        i += 1;
    }

    sum
}
