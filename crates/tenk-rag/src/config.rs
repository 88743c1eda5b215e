//! Configuration for the filing pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Input/output locations
    pub paths: PathsConfig,
    /// HTML normalizer configuration
    pub normalizer: NormalizerConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Extractive QA model configuration
    pub qa: QaConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Answer rendering configuration
    pub answer: AnswerConfig,
    /// Ollama/LLM configuration (synthesis strategy)
    pub llm: LlmConfig,
    /// SEC EDGAR download configuration
    pub edgar: EdgarConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file; absent sections keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.search_window == 0 {
            return Err(Error::Config("retrieval.search_window must be > 0".to_string()));
        }
        if self.retrieval.top_k > self.retrieval.search_window {
            return Err(Error::Config(format!(
                "retrieval.top_k ({}) cannot exceed retrieval.search_window ({})",
                self.retrieval.top_k, self.retrieval.search_window
            )));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be > 0".to_string()));
        }
        if self.chunking.max_chunk_chars == 0 {
            return Err(Error::Config("chunking.max_chunk_chars must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Filesystem layout of the batch pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// `{company}/{document}.htm(l)` raw filings
    pub raw_dir: PathBuf,
    /// `{company}/{document}.txt` normalized text
    pub txt_dir: PathBuf,
    /// `{company}/{document}_chunks.json` chunk artifacts
    pub chunks_dir: PathBuf,
    /// Serialized vector index
    pub index_path: PathBuf,
    /// Ordered chunk metadata, one record per index row
    pub metadata_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw/10k_filings"),
            txt_dir: PathBuf::from("data/processed/10k_text"),
            chunks_dir: PathBuf::from("data/chunks/10k_chunks"),
            index_path: PathBuf::from("data/index/chunks.idx"),
            metadata_path: PathBuf::from("data/index/chunk_metadata.json"),
        }
    }
}

/// HTML normalizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Bold blocks with fewer words than this are treated as headings
    pub max_heading_words: usize,
    /// Lines that mark the start of the filing proper; earlier lines are dropped
    pub front_matter_anchors: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_heading_words: 20,
            front_matter_anchors: vec![
                "SECURITIES AND EXCHANGE COMMISSION".to_string(),
                "FORM 10-K".to_string(),
            ],
        }
    }
}

/// Section chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Chunks with fewer words are dropped
    pub min_chunk_words: usize,
    /// A blank line flushes the paragraph buffer once it exceeds this many chars
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_words: 8,
            max_chunk_chars: 1000,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name (default: all-MiniLM-L6-v2)
    pub model: String,
    /// Hugging Face repository holding `onnx/model.onnx` and `tokenizer.json`
    pub hub_repo: String,
    /// Embedding dimensions (384 for MiniLM)
    pub dimensions: usize,
    /// Batch size for embedding generation
    pub batch_size: usize,
    /// Maximum sequence length
    pub max_length: usize,
    /// Cache directory for models
    pub cache_dir: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            hub_repo: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            dimensions: 384,
            batch_size: 32,
            max_length: 256,
            cache_dir: default_model_dir("all-MiniLM-L6-v2"),
        }
    }
}

/// Extractive question-answering model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Model name
    pub model: String,
    /// Hugging Face repository holding `onnx/model.onnx` and `tokenizer.json`
    pub hub_repo: String,
    /// Maximum question + context length in tokens
    pub max_length: usize,
    /// Longest answer span in tokens
    pub max_answer_tokens: usize,
    /// Cache directory for models
    pub cache_dir: PathBuf,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            model: "distilbert-base-cased-distilled-squad".to_string(),
            hub_repo: "Xenova/distilbert-base-cased-distilled-squad".to_string(),
            max_length: 384,
            max_answer_tokens: 15,
            cache_dir: default_model_dir("distilbert-base-cased-distilled-squad"),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Nearest neighbours examined before filtering
    pub search_window: usize,
    /// Results returned after filtering
    pub top_k: usize,
    /// Retrieved chunks with fewer words are skipped
    pub min_result_words: usize,
    /// Skip table chunks at query time
    pub exclude_tables: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_window: 20,
            top_k: 5,
            min_result_words: 10,
            exclude_tables: true,
        }
    }
}

/// Which answer strategy the CLI uses by default
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStrategy {
    /// Best extractive span across retrieved chunks
    #[default]
    Extractive,
    /// Free-text synthesis over the concatenated context
    Summary,
}

/// Answer rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    /// Default strategy
    pub strategy: AnswerStrategy,
    /// Characters of winning context shown in the preview
    pub preview_chars: usize,
    /// Context budget for the synthesis strategy
    pub summary_context_chars: usize,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            strategy: AnswerStrategy::Extractive,
            preview_chars: 700,
            summary_context_chars: 3000,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Load the LLM at start-up
    pub enabled: bool,
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434".to_string(),
            generate_model: "phi3".to_string(),
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// SEC EDGAR download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgarConfig {
    /// SEC requires a descriptive User-Agent with a contact address
    pub user_agent: String,
    /// Tickers to download
    pub tickers: Vec<String>,
    /// Filing years to keep
    pub years: Vec<i32>,
    /// Submissions API base URL
    pub data_url: String,
    /// www.sec.gov base URL (ticker map and archives)
    pub www_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EdgarConfig {
    fn default() -> Self {
        Self {
            user_agent: "tenk-rag research contact@example.com".to_string(),
            tickers: vec!["AAPL".to_string(), "MSFT".to_string(), "TSLA".to_string()],
            years: (2019..=2023).collect(),
            data_url: "https://data.sec.gov".to_string(),
            www_url: "https://www.sec.gov".to_string(),
            timeout_secs: 10,
        }
    }
}

fn default_model_dir(model: &str) -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tenk-rag")
        .join("models")
        .join(model)
}
