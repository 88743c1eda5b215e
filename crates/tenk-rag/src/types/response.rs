//! Query-time result types

use serde::{Deserialize, Serialize};

use super::chunk::ChunkRecord;

/// A chunk returned by the retriever
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Chunk text
    pub text: String,
    /// Metadata record the text came from
    pub meta: ChunkRecord,
    /// Squared L2 distance to the query embedding
    pub distance: f32,
}

/// One extractive answer over one retrieved chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerCandidate {
    /// Verbatim span from the context
    pub answer: String,
    /// Model confidence (0.0-1.0)
    pub score: f32,
    /// Context the span was extracted from
    pub context: String,
    /// Metadata of the context chunk
    pub meta: ChunkRecord,
}

/// Final outcome of a question
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Answer {
    /// Highest-scoring extractive span, with every candidate ranked best first
    Found {
        best: AnswerCandidate,
        candidates: Vec<AnswerCandidate>,
    },
    /// Free-text synthesis over the retrieved context
    Summary {
        text: String,
        sources: Vec<ChunkRecord>,
    },
    /// Retrieval produced nothing that passed the filters
    NotFound,
}

impl Answer {
    /// Context behind the answer, if any
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Found { best, .. } => Some(&best.context),
            Self::Summary { .. } | Self::NotFound => None,
        }
    }

    /// True when nothing relevant was found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}
