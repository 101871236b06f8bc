//! kbstore: vector storage for retrieval pipelines.
//!
//! This crate re-exports the kbstore sub-crates for single-import usage.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `default` | `vectorstores` |
//! | `vectorstores` | `BasicVectorDb`, flat index, snapshots, descriptor factory |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kbstore::core::{ChunkMetadata, MetadataFilter, VectorDb};
//! use kbstore::vectorstores::{BasicVectorDb, BasicVectorDbConfig, from_descriptor};
//! ```

/// Core traits and types: VectorDb, ChunkMetadata, MetadataFilter, KbError.
/// Always available.
pub use kbstore_core as core;

/// In-process reference store, search engines, persistence and descriptors.
#[cfg(feature = "vectorstores")]
pub use kbstore_vectorstores as vectorstores;
