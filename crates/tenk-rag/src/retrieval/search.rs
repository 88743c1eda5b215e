//! Query-time retrieval with company, type and length filters

use std::sync::Arc;

use super::store::IndexStore;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::providers::EmbeddingProvider;
use crate::types::{ChunkType, RetrievalResult};

/// Nearest-neighbour retriever over an [`IndexStore`]
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<IndexStore>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever; `embedder` must be the model the index was built with
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<IndexStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Up to `top_k` chunks for `query`, nearest first
    ///
    /// Only the `search_window` nearest neighbours are considered, so a
    /// restrictive company filter can return fewer than `top_k` results.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        company: Option<&str>,
    ) -> Result<Vec<RetrievalResult>> {
        if self.store.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;
        let neighbors = self
            .store
            .index()
            .search(&embedding, self.config.search_window)?;

        let results: Vec<RetrievalResult> = neighbors
            .into_iter()
            .filter_map(|n| {
                self.store.record(n.position).map(|meta| RetrievalResult {
                    text: meta.chunk.text.clone(),
                    meta: meta.clone(),
                    distance: n.distance,
                })
            })
            .filter(|r| company.map_or(true, |c| r.meta.chunk.company.eq_ignore_ascii_case(c)))
            .filter(|r| !(self.config.exclude_tables && r.meta.chunk.chunk_type == ChunkType::Table))
            .filter(|r| r.meta.chunk.word_count() >= self.config.min_result_words)
            .take(top_k)
            .collect();

        tracing::debug!(
            "Retrieved {} chunks for {:?} (company: {:?})",
            results.len(),
            query,
            company
        );
        Ok(results)
    }

    /// Search with the configured `top_k`
    pub async fn search_default(
        &self,
        query: &str,
        company: Option<&str>,
    ) -> Result<Vec<RetrievalResult>> {
        self.search(query, self.config.top_k, company).await
    }

    /// Distinct companies in the index, sorted
    pub fn companies(&self) -> Vec<String> {
        self.store.companies()
    }

    /// Number of indexed chunks
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// True when the index holds no chunks
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
