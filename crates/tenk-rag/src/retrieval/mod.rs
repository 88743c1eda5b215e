//! Vector index, metadata store, indexing and query-time retrieval

pub mod index;
pub mod indexer;
pub mod search;
pub mod store;

pub use index::{FlatIndex, Neighbor};
pub use indexer::Indexer;
pub use search::Retriever;
pub use store::IndexStore;
