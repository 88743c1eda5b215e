//! ONNX extractive question answering (DistilBERT fine-tuned on SQuAD)
//!
//! The question and context are encoded as a pair; start and end logits are
//! softmaxed over the context tokens and the best span no longer than
//! `max_answer_tokens` wins, scored by `p(start) * p(end)`.

use async_trait::async_trait;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokenizers::{Tokenizer, TruncationParams, TruncationStrategy};

use super::download::ensure_model_files;
use super::qa::{QaProvider, QaSpan};
use crate::config::QaConfig;
use crate::error::{Error, Result};

struct QaInner {
    session: Session,
    tokenizer: Tokenizer,
}

/// DistilBERT SQuAD model served through ONNX Runtime
#[derive(Clone)]
pub struct OnnxQaModel {
    inner: Arc<Mutex<QaInner>>,
    model: String,
    max_answer_tokens: usize,
}

impl OnnxQaModel {
    /// Load the model, downloading it on first use
    pub async fn new(config: &QaConfig) -> Result<Self> {
        tracing::info!("Initializing ONNX QA model: {}", config.model);

        let files = ensure_model_files(&config.hub_repo, &config.cache_dir, Error::Qa).await?;
        let session = load_session(&files.model)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| Error::qa(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                strategy: TruncationStrategy::OnlySecond,
                ..Default::default()
            }))
            .map_err(|e| Error::qa(format!("Failed to configure truncation: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(QaInner { session, tokenizer })),
            model: config.model.clone(),
            max_answer_tokens: config.max_answer_tokens.max(1),
        })
    }

    /// Run one question/context pair synchronously
    pub fn answer_blocking(&self, question: &str, context: &str) -> Result<QaSpan> {
        let mut inner = self.inner.lock();

        let encoding = inner
            .tokenizer
            .encode((question, context), true)
            .map_err(|e| Error::qa(format!("Tokenization failed: {}", e)))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let seq_len = ids.len();

        let input_ids = Tensor::from_array((vec![1, seq_len], ids.into_boxed_slice()))
            .map_err(|e| Error::qa(format!("Input tensor creation failed: {}", e)))?;
        let attention_mask = Tensor::from_array((vec![1, seq_len], mask.into_boxed_slice()))
            .map_err(|e| Error::qa(format!("Attention mask tensor creation failed: {}", e)))?;

        let inputs = vec![
            ("input_ids", input_ids.into_dyn()),
            ("attention_mask", attention_mask.into_dyn()),
        ];
        let outputs = inner
            .session
            .run(inputs)
            .map_err(|e| Error::qa(format!("Inference failed: {}", e)))?;

        let output_iter: Vec<_> = outputs.iter().collect();
        let logits = |name: &str, fallback: usize| -> Result<Vec<f32>> {
            let output = output_iter
                .iter()
                .find(|(n, _)| *n == name)
                .or_else(|| output_iter.get(fallback))
                .map(|(_, v)| v)
                .ok_or_else(|| Error::qa(format!("Missing output tensor {}", name)))?;
            let (_, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::qa(format!("Failed to extract {}: {}", name, e)))?;
            Ok(data.to_vec())
        };
        let start_logits = logits("start_logits", 0)?;
        let end_logits = logits("end_logits", 1)?;

        let context_mask: Vec<bool> = encoding
            .get_sequence_ids()
            .iter()
            .map(|s| *s == Some(1))
            .collect();

        let (start_tok, end_tok, score) = best_span(
            &start_logits,
            &end_logits,
            &context_mask,
            self.max_answer_tokens,
        )
        .ok_or_else(|| Error::qa("Context produced no answerable tokens"))?;

        let offsets = encoding.get_offsets();
        let start = offsets
            .get(start_tok)
            .map(|o| o.0)
            .ok_or_else(|| Error::qa("Answer start outside token offsets"))?;
        let end = offsets
            .get(end_tok)
            .map(|o| o.1)
            .ok_or_else(|| Error::qa("Answer end outside token offsets"))?;
        let answer = context
            .get(start..end)
            .ok_or_else(|| Error::qa("Answer offsets do not fall on char boundaries"))?
            .to_string();

        Ok(QaSpan {
            answer,
            score,
            start,
            end,
        })
    }
}

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| Error::qa(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| Error::qa(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(4)
        .map_err(|e| Error::qa(format!("Failed to set threads: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| Error::qa(format!("Failed to load model: {}", e)))
}

/// Softmax restricted to `allowed` positions; others get probability 0
fn masked_softmax(logits: &[f32], allowed: &[bool]) -> Vec<f32> {
    let max = logits
        .iter()
        .zip(allowed)
        .filter(|(_, ok)| **ok)
        .map(|(&l, _)| l)
        .fold(f32::NEG_INFINITY, f32::max);
    if max == f32::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }

    let exps: Vec<f32> = logits
        .iter()
        .zip(allowed)
        .map(|(&l, &ok)| if ok { (l - max).exp() } else { 0.0 })
        .collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Highest `p(start) * p(end)` span with `start <= end < start + max_len`
///
/// Returns `(start_token, end_token, score)`, or `None` when no token is allowed.
pub(crate) fn best_span(
    start_logits: &[f32],
    end_logits: &[f32],
    allowed: &[bool],
    max_len: usize,
) -> Option<(usize, usize, f32)> {
    let len = start_logits.len().min(end_logits.len()).min(allowed.len());
    let p_start = masked_softmax(&start_logits[..len], &allowed[..len]);
    let p_end = masked_softmax(&end_logits[..len], &allowed[..len]);

    let mut best: Option<(usize, usize, f32)> = None;
    for s in (0..len).filter(|&s| allowed[s]) {
        for e in (s..len.min(s + max_len)).filter(|&e| allowed[e]) {
            let score = p_start[s] * p_end[e];
            if best.map_or(true, |(_, _, b)| score > b) {
                best = Some((s, e, score));
            }
        }
    }
    best
}

#[async_trait]
impl QaProvider for OnnxQaModel {
    async fn answer(&self, question: &str, context: &str) -> Result<QaSpan> {
        let model = self.clone();
        let question = question.to_string();
        let context = context.to_string();
        tokio::task::spawn_blocking(move || model.answer_blocking(&question, &context))
            .await
            .map_err(|e| Error::internal(format!("Task join error: {}", e)))?
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_probability_span() {
        // [CLS] q [SEP] c1 c2 c3 [SEP]
        let allowed = [false, false, false, true, true, true, false];
        let start = [9.0, 9.0, 0.0, 0.1, 5.0, 0.2, 0.0];
        let end = [9.0, 0.0, 0.0, 0.1, 0.3, 6.0, 9.0];

        let (s, e, score) = best_span(&start, &end, &allowed, 15).unwrap();
        assert_eq!((s, e), (4, 5));
        assert!(score > 0.0 && score <= 1.0);
    }

    #[test]
    fn span_never_ends_before_start() {
        let allowed = [true, true, true];
        let start = [0.0, 0.0, 8.0];
        let end = [8.0, 0.0, 0.0];

        let (s, e, _) = best_span(&start, &end, &allowed, 15).unwrap();
        assert!(s <= e);
    }

    #[test]
    fn span_length_is_bounded() {
        let allowed = [true; 6];
        let start = [8.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let end = [0.0, 0.0, 0.0, 0.0, 0.0, 8.0];

        let (s, e, _) = best_span(&start, &end, &allowed, 3).unwrap();
        assert!(e < s + 3);
    }

    #[test]
    fn no_allowed_tokens_means_no_span() {
        assert!(best_span(&[1.0, 2.0], &[1.0, 2.0], &[false, false], 15).is_none());
    }

    #[test]
    fn softmax_sums_to_one_over_allowed() {
        let probs = masked_softmax(&[1.0, 2.0, 3.0], &[true, false, true]);
        assert_eq!(probs[1], 0.0);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }
}
