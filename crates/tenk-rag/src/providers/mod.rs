//! Model providers: embeddings, extractive QA and the optional LLM
//!
//! Trait-based so the retriever and answerer never depend on a concrete
//! runtime; [`Models`] bundles the loaded handles.

pub mod download;
pub mod embedding;
pub mod llm;
pub mod ollama;
pub mod onnx_embedder;
pub mod onnx_qa;
pub mod qa;

use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::Result;

pub use embedding::EmbeddingProvider;
pub use llm::LlmProvider;
pub use ollama::{OllamaClient, OllamaLlm};
pub use onnx_embedder::OnnxEmbedder;
pub use onnx_qa::OnnxQaModel;
pub use qa::{QaProvider, QaSpan};

/// Immutable model handles, loaded once at start-up and passed explicitly
#[derive(Clone)]
pub struct Models {
    /// Sentence embedder shared by indexing and querying
    pub embedder: Arc<dyn EmbeddingProvider>,
    /// Extractive QA model
    pub qa: Arc<dyn QaProvider>,
    /// LLM for the summary strategy, when enabled
    pub llm: Option<Arc<dyn LlmProvider>>,
}

impl Models {
    /// Assemble from already-built providers
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        qa: Arc<dyn QaProvider>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self { embedder, qa, llm }
    }

    /// Load the ONNX models (and Ollama when enabled) described by `config`
    pub async fn load(config: &RagConfig) -> Result<Self> {
        let embedder = OnnxEmbedder::new(&config.embeddings).await?;
        let qa = OnnxQaModel::new(&config.qa).await?;

        let llm: Option<Arc<dyn LlmProvider>> = if config.llm.enabled {
            let llm = OllamaLlm::new(&config.llm)?;
            if !llm.health_check().await? {
                tracing::warn!(
                    "Ollama at {} is not reachable; summary answers will fail",
                    config.llm.base_url
                );
            }
            Some(Arc::new(llm))
        } else {
            None
        };

        Ok(Self::new(Arc::new(embedder), Arc::new(qa), llm))
    }

    /// Embedder only, for indexing runs that never answer questions
    pub async fn load_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
        Ok(Arc::new(OnnxEmbedder::new(&config.embeddings).await?))
    }
}
