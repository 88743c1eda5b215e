//! tenk-rag: question answering over SEC 10-K filings with source citations
//!
//! Raw EDGAR HTML is normalized to structured text, chunked along the
//! filing's PART/ITEM sections, embedded into a flat L2 index and queried
//! with an extractive QA model. Every answer carries the company, year,
//! section and file it came from.

pub mod chat;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use types::{
    chunk::{Chunk, ChunkKey, ChunkRecord, ChunkType, FilingRef},
    response::{Answer, AnswerCandidate, RetrievalResult},
};
