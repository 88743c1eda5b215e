//! Extractive question-answering provider trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A verbatim answer span inside one context passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaSpan {
    /// Answer text, copied from the context
    pub answer: String,
    /// Model confidence (0.0-1.0)
    pub score: f32,
    /// Byte offset of the answer in the context
    pub start: usize,
    /// Exclusive byte end of the answer in the context
    pub end: usize,
}

/// Trait for extractive QA models
#[async_trait]
pub trait QaProvider: Send + Sync {
    /// Extract the best answer span for `question` from `context`
    async fn answer(&self, question: &str, context: &str) -> Result<QaSpan>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
