//! In-process vector storage for kbstore.
//!
//! [`BasicVectorDb`] is the reference implementation of
//! [`VectorDb`](kbstore_core::VectorDb): parallel vector/metadata arrays,
//! cosine-similarity search by brute force ([`similarity`]) or through an
//! exact flat index ([`flat_index`]), and a JSON snapshot per knowledge base
//! ([`persistence`]). [`from_descriptor`] rebuilds any known backend from
//! the JSON produced by `to_descriptor`.
//!
//! # Example
//!
//! ```rust,no_run
//! use kbstore_vectorstores::{from_descriptor, BasicVectorDb, BasicVectorDbConfig, VectorDb};
//!
//! # async fn example() -> Result<(), kbstore_vectorstores::KbError> {
//! let db = BasicVectorDb::new(BasicVectorDbConfig::new("docs", "/tmp/kb"))?;
//! let again = from_descriptor(db.to_descriptor())?;
//! again.load().await?;
//! # Ok(())
//! # }
//! ```

mod basic;
pub mod descriptor;
pub mod flat_index;
pub mod persistence;
pub mod similarity;

pub use basic::{
    BasicVectorDb, BasicVectorDbConfig, SearchStrategy, BASIC_VECTOR_DB, DEFAULT_STORAGE_DIRECTORY,
};
pub use descriptor::{from_descriptor, VectorDbDescriptor, KNOWN_BACKENDS};
pub use flat_index::FlatIndex;
pub use similarity::{cosine_similarity, BruteForce, NearestNeighbors, Neighbor};

// Re-export core types for convenience.
pub use kbstore_core::{
    ChunkMetadata, FilterOperator, KbError, MetadataFilter, VectorDb, VectorSearchResult,
    DEFAULT_TOP_K,
};
