//! ONNX-based embedding generation
//!
//! Uses the all-MiniLM-L6-v2 sentence-transformers export for 384-dimensional
//! embeddings. Mean pooling over the attention mask, then L2 normalization.

use async_trait::async_trait;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams};

use super::download::ensure_model_files;
use super::embedding::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Session and tokenizer, used by one inference at a time
struct EmbedderInner {
    session: Session,
    tokenizer: Tokenizer,
}

/// ONNX-based text embedder
#[derive(Clone)]
pub struct OnnxEmbedder {
    inner: Arc<Mutex<EmbedderInner>>,
    model: String,
    dimensions: usize,
    max_length: usize,
    batch_size: usize,
}

impl OnnxEmbedder {
    /// Create a new ONNX embedder, downloading the model on first use
    pub async fn new(config: &EmbeddingConfig) -> Result<Self> {
        tracing::info!("Initializing ONNX embedder with model: {}", config.model);

        let files = ensure_model_files(&config.hub_repo, &config.cache_dir, Error::Embedding).await?;
        let session = load_session(&files.model)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| Error::embedding(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| Error::embedding(format!("Failed to configure truncation: {}", e)))?;

        tracing::info!("ONNX embedder initialized successfully");

        Ok(Self {
            inner: Arc::new(Mutex::new(EmbedderInner { session, tokenizer })),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_length: config.max_length,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Embed texts synchronously, in `batch_size` slices
    pub fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut inner = self.inner.lock();
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all_embeddings.extend(self.embed_batch_internal(&mut inner, batch)?);
        }
        Ok(all_embeddings)
    }

    fn embed_batch_internal(
        &self,
        inner: &mut EmbedderInner,
        texts: &[String],
    ) -> Result<Vec<Vec<f32>>> {
        let batch_size = texts.len();
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();

        let encodings = inner
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| Error::embedding(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_length);
        if max_len == 0 {
            return Ok(vec![vec![0.0; self.dimensions]; batch_size]);
        }

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();
            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
                token_type_ids[i * max_len + j] = types[j] as i64;
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))
            .map_err(|e| Error::embedding(format!("Input tensor creation failed: {}", e)))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.clone().into_boxed_slice()))
                .map_err(|e| Error::embedding(format!("Attention mask tensor creation failed: {}", e)))?;
        let token_type_ids_tensor =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice()))
                .map_err(|e| Error::embedding(format!("Token type tensor creation failed: {}", e)))?;

        let session_inputs = vec![
            ("input_ids", input_ids_tensor.into_dyn()),
            ("attention_mask", attention_mask_tensor.into_dyn()),
            ("token_type_ids", token_type_ids_tensor.into_dyn()),
        ];

        let outputs = inner
            .session
            .run(session_inputs)
            .map_err(|e| Error::embedding(format!("Inference failed: {}", e)))?;

        let output_iter: Vec<_> = outputs.iter().collect();
        let output = output_iter
            .iter()
            .find(|(name, _)| *name == "last_hidden_state")
            .or_else(|| output_iter.first())
            .map(|(_, v)| v)
            .ok_or_else(|| Error::embedding("No output tensor"))?;

        let (tensor_shape, tensor_data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::embedding(format!("Failed to extract tensor: {}", e)))?;

        let dims: Vec<usize> = tensor_shape.iter().map(|&d| d as usize).collect();
        let hidden_size = dims.get(2).copied().unwrap_or(self.dimensions);
        if hidden_size != self.dimensions {
            return Err(Error::embedding(format!(
                "Model produced {} dimensions, configured for {}",
                hidden_size, self.dimensions
            )));
        }

        let embeddings = (0..batch_size)
            .map(|i| {
                let rows = (0..max_len).map(|j| {
                    let offset = (i * max_len + j) * hidden_size;
                    let token = tensor_data.get(offset..offset + hidden_size).unwrap_or(&[]);
                    (token, attention_mask[i * max_len + j] as f32)
                });
                mean_pool(rows, hidden_size)
            })
            .collect();

        Ok(embeddings)
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| Error::embedding(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| Error::embedding(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(4)
        .map_err(|e| Error::embedding(format!("Failed to set threads: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| Error::embedding(format!("Failed to load model: {}", e)))
}

/// Attention-masked mean of token vectors, L2 normalized
pub(crate) fn mean_pool<'a>(
    tokens: impl Iterator<Item = (&'a [f32], f32)>,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for (token, mask) in tokens {
        if mask <= 0.0 {
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(token) {
            *acc += value * mask;
        }
        count += mask;
    }

    if count > 0.0 {
        for val in &mut sum {
            *val /= count;
        }
    }

    let norm: f32 = sum.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut sum {
            *val /= norm;
        }
    }
    sum
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| Error::embedding("Empty embedding result"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embedder = self.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || embedder.embed_blocking(&texts))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_ignores_padding() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let pad = [100.0f32, 100.0];
        let pooled = mean_pool(
            vec![(&a[..], 1.0), (&b[..], 1.0), (&pad[..], 0.0)].into_iter(),
            2,
        );
        let expected = 1.0 / 2f32.sqrt();
        assert!((pooled[0] - expected).abs() < 1e-6);
        assert!((pooled[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn mean_pool_of_nothing_is_zero() {
        let pooled = mean_pool(std::iter::empty(), 3);
        assert_eq!(pooled, vec![0.0, 0.0, 0.0]);
    }
}
