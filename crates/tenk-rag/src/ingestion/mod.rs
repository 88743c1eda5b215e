//! Filing ingestion: download, HTML normalization, classification and chunking

pub mod chunker;
pub mod classifier;
pub mod edgar;
pub mod normalizer;
pub mod pipeline;

pub use chunker::SectionChunker;
pub use classifier::{classify, LineKind};
pub use edgar::{EdgarClient, FilingInfo};
pub use normalizer::FilingNormalizer;
pub use pipeline::{chunk_dir, convert_dir, BatchReport};
