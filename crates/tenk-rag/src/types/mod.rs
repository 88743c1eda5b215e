//! Core types for the filing pipeline

pub mod chunk;
pub mod response;

pub use chunk::{Chunk, ChunkKey, ChunkRecord, ChunkType, FilingRef};
pub use response::{Answer, AnswerCandidate, RetrievalResult};
