use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use kbstore_core::{
    check_batch_lengths, ChunkMetadata, KbError, MetadataFilter, VectorDb, VectorSearchResult,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::flat_index::FlatIndex;
use crate::persistence::{self, SnapshotRef, SNAPSHOT_FORMAT_VERSION};
use crate::similarity::{BruteForce, NearestNeighbors};

/// Descriptor discriminator for [`BasicVectorDb`].
pub const BASIC_VECTOR_DB: &str = "BasicVectorDB";

/// Storage root used by [`BasicVectorDbConfig::in_default_directory`].
pub const DEFAULT_STORAGE_DIRECTORY: &str = "~/kbstore";

fn default_true() -> bool {
    true
}

fn all_finite(v: &[f32]) -> bool {
    v.iter().all(|x| x.is_finite())
}

// ---------------------------------------------------------------------------
// SearchStrategy
// ---------------------------------------------------------------------------

/// How [`BasicVectorDb`] ranks rows. Both strategies return the same result
/// sets; they differ only in cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Score every row on every query.
    BruteForce,
    /// Score against a lazily built [`FlatIndex`].
    Index,
}

impl SearchStrategy {
    fn from_use_index(use_index: bool) -> Self {
        if use_index {
            SearchStrategy::Index
        } else {
            SearchStrategy::BruteForce
        }
    }
}

// ---------------------------------------------------------------------------
// BasicVectorDbConfig
// ---------------------------------------------------------------------------

/// Identity and behaviour of a [`BasicVectorDb`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicVectorDbConfig {
    /// Knowledge-base identifier; also the snapshot file stem.
    pub kb_id: String,
    /// Storage root. A leading `~` expands to `$HOME`.
    pub storage_directory: String,
    /// Search through the flat index instead of brute force. Defaults to `true`.
    #[serde(default = "default_true")]
    pub use_index: bool,
    /// Persist after every `add_vectors` / `remove_document`. Defaults to `true`.
    #[serde(default = "default_true")]
    pub auto_save: bool,
    /// Fixed dimensionality. When unset, the first inserted vector decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
}

impl BasicVectorDbConfig {
    pub fn new(kb_id: impl Into<String>, storage_directory: impl Into<String>) -> Self {
        Self {
            kb_id: kb_id.into(),
            storage_directory: storage_directory.into(),
            use_index: true,
            auto_save: true,
            dimension: None,
        }
    }

    /// Config rooted at [`DEFAULT_STORAGE_DIRECTORY`].
    pub fn in_default_directory(kb_id: impl Into<String>) -> Self {
        Self::new(kb_id, DEFAULT_STORAGE_DIRECTORY)
    }

    pub fn with_index(mut self, use_index: bool) -> Self {
        self.use_index = use_index;
        self
    }

    pub fn with_search_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.use_index = strategy == SearchStrategy::Index;
        self
    }

    pub fn with_auto_save(mut self, auto_save: bool) -> Self {
        self.auto_save = auto_save;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

// ---------------------------------------------------------------------------
// BasicVectorDb
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Rows {
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMetadata>,
    dimension: Option<usize>,
}

/// In-process reference store.
///
/// Keeps vectors and their [`ChunkMetadata`] as parallel arrays in insertion
/// order and persists them as a single JSON snapshot (see
/// [`persistence`](crate::persistence)). Searches run either brute force or
/// through a [`FlatIndex`] that is dropped on every mutation and rebuilt on
/// the next indexed search.
///
/// Reads share a lock and mutations take it exclusively, so concurrent use
/// through `&self` is safe within one process. Two processes saving the same
/// `kb_id` race and the last write wins.
///
/// # Example
///
/// ```rust,no_run
/// use kbstore_core::{ChunkMetadata, VectorDb};
/// use kbstore_vectorstores::{BasicVectorDb, BasicVectorDbConfig};
///
/// # async fn example() -> Result<(), kbstore_core::KbError> {
/// let db = BasicVectorDb::open(BasicVectorDbConfig::new("docs", "/var/lib/kb")).await?;
/// db.add_vectors(
///     vec![vec![1.0, 0.0]],
///     vec![ChunkMetadata::new("doc-1", 0, "Intro", "Hello")],
/// )
/// .await?;
/// let hits = db.search(&[1.0, 0.0], 5, None).await?;
/// # Ok(())
/// # }
/// ```
pub struct BasicVectorDb {
    config: BasicVectorDbConfig,
    storage_path: PathBuf,
    use_index: AtomicBool,
    rows: RwLock<Rows>,
    /// Always built over the current `rows`; `None` means stale.
    index: RwLock<Option<Arc<FlatIndex>>>,
}

impl BasicVectorDb {
    /// Create an empty store. Nothing is read from disk.
    pub fn new(config: BasicVectorDbConfig) -> Result<Self, KbError> {
        persistence::validate_kb_id(&config.kb_id)?;
        if config.dimension == Some(0) {
            return Err(KbError::Config("dimension must be greater than zero".to_string()));
        }

        let storage_path = persistence::vector_storage_path(&config.storage_directory, &config.kb_id);
        let rows = Rows {
            dimension: config.dimension,
            ..Rows::default()
        };

        Ok(Self {
            use_index: AtomicBool::new(config.use_index),
            storage_path,
            rows: RwLock::new(rows),
            index: RwLock::new(None),
            config,
        })
    }

    /// Create a store and load its snapshot if one exists.
    pub async fn open(config: BasicVectorDbConfig) -> Result<Self, KbError> {
        let db = Self::new(config)?;
        db.load().await?;
        Ok(db)
    }

    pub fn config(&self) -> &BasicVectorDbConfig {
        &self.config
    }

    /// Where [`save`](VectorDb::save) writes the snapshot.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn search_strategy(&self) -> SearchStrategy {
        SearchStrategy::from_use_index(self.use_index.load(Ordering::Relaxed))
    }

    /// Switch strategy for subsequent searches.
    pub fn set_search_strategy(&self, strategy: SearchStrategy) {
        self.use_index
            .store(strategy == SearchStrategy::Index, Ordering::Relaxed);
    }

    /// Fixed dimensionality, once known.
    pub async fn dimension(&self) -> Option<usize> {
        self.rows.read().await.dimension
    }

    /// Metadata of every row, in insertion order.
    pub async fn metadata(&self) -> Vec<ChunkMetadata> {
        self.rows.read().await.metadata.clone()
    }

    /// Every stored vector, in insertion order.
    pub async fn vectors(&self) -> Vec<Vec<f32>> {
        self.rows.read().await.vectors.clone()
    }

    /// Search with an explicit strategy, ignoring the configured one.
    pub async fn search_with_strategy(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        strategy: SearchStrategy,
    ) -> Result<Vec<VectorSearchResult>, KbError> {
        if let Some(filter) = filter {
            filter.validate()?;
        }
        if !all_finite(query) {
            return Err(KbError::Validation(
                "query has a NaN or infinite component".to_string(),
            ));
        }

        let rows = self.rows.read().await;
        if rows.vectors.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dimension) = rows.dimension {
            if query.len() != dimension {
                return Err(KbError::Validation(format!(
                    "query has dimension {} but the store holds {dimension}-dimensional vectors",
                    query.len()
                )));
            }
        }

        let eligible = |row: usize| filter.map_or(true, |f| f.matches(&rows.metadata[row]));
        let neighbors = match strategy {
            SearchStrategy::BruteForce => BruteForce::new(&rows.vectors).nearest(query, top_k, &eligible),
            SearchStrategy::Index => self
                .current_index(&rows)
                .await
                .nearest(query, top_k, &eligible),
        };

        tracing::debug!(
            kb_id = %self.config.kb_id,
            strategy = ?strategy,
            top_k,
            filtered = filter.is_some(),
            hits = neighbors.len(),
            "search"
        );

        Ok(neighbors
            .into_iter()
            .map(|n| VectorSearchResult {
                metadata: rows.metadata[n.row].clone(),
                similarity: n.similarity,
            })
            .collect())
    }

    /// Return the cached index, building it if it is missing or does not
    /// cover every row.
    async fn current_index(&self, rows: &Rows) -> Arc<FlatIndex> {
        {
            let cached = self.index.read().await;
            if let Some(index) = cached.as_ref().filter(|i| i.len() == rows.vectors.len()) {
                return Arc::clone(index);
            }
        }

        let mut slot = self.index.write().await;
        if let Some(index) = slot.as_ref().filter(|i| i.len() == rows.vectors.len()) {
            return Arc::clone(index);
        }

        let index = Arc::new(FlatIndex::build(&rows.vectors));
        tracing::debug!(kb_id = %self.config.kb_id, rows = index.len(), "built flat index");
        *slot = Some(Arc::clone(&index));
        index
    }

    async fn invalidate_index(&self) {
        *self.index.write().await = None;
    }

    async fn persist(
        &self,
        vectors: &[Vec<f32>],
        metadata: &[ChunkMetadata],
        dimension: Option<usize>,
    ) -> Result<(), KbError> {
        let snapshot = SnapshotRef {
            format_version: SNAPSHOT_FORMAT_VERSION,
            kb_id: &self.config.kb_id,
            dimension,
            vectors,
            metadata,
        };
        persistence::write_snapshot(&self.storage_path, &snapshot).await?;
        tracing::info!(
            kb_id = %self.config.kb_id,
            path = %self.storage_path.display(),
            rows = vectors.len(),
            "saved vector snapshot"
        );
        Ok(())
    }
}

#[async_trait]
impl VectorDb for BasicVectorDb {
    async fn add_vectors(
        &self,
        vectors: Vec<Vec<f32>>,
        metadata: Vec<ChunkMetadata>,
    ) -> Result<(), KbError> {
        check_batch_lengths(vectors.len(), metadata.len())?;
        if vectors.is_empty() {
            return Ok(());
        }

        let mut rows = self.rows.write().await;
        let dimension = rows.dimension.unwrap_or(vectors[0].len());
        if dimension == 0 {
            return Err(KbError::Validation(
                "vectors must have at least one component".to_string(),
            ));
        }
        if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
            return Err(KbError::Validation(format!(
                "vector {i} has dimension {} but the store expects {dimension}",
                v.len()
            )));
        }
        if let Some(i) = vectors.iter().position(|v| !all_finite(v)) {
            return Err(KbError::Validation(format!(
                "vector {i} has a NaN or infinite component"
            )));
        }

        let before = rows.vectors.len();
        let previous_dimension = rows.dimension;
        let added = vectors.len();
        rows.dimension = Some(dimension);
        rows.vectors.extend(vectors);
        rows.metadata.extend(metadata);

        if self.config.auto_save {
            let saved = self
                .persist(&rows.vectors, &rows.metadata, rows.dimension)
                .await;
            if let Err(e) = saved {
                rows.vectors.truncate(before);
                rows.metadata.truncate(before);
                rows.dimension = previous_dimension;
                return Err(e);
            }
        }

        self.invalidate_index().await;
        tracing::debug!(
            kb_id = %self.config.kb_id,
            added,
            total = rows.vectors.len(),
            "added vectors"
        );
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorSearchResult>, KbError> {
        self.search_with_strategy(query, top_k, filter, self.search_strategy())
            .await
    }

    async fn remove_document(&self, doc_id: &str) -> Result<(), KbError> {
        let mut rows = self.rows.write().await;
        if !rows.metadata.iter().any(|m| m.doc_id == doc_id) {
            tracing::debug!(kb_id = %self.config.kb_id, doc_id, "remove_document: no matching rows");
            return Ok(());
        }

        let (vectors, metadata): (Vec<Vec<f32>>, Vec<ChunkMetadata>) = rows
            .vectors
            .iter()
            .zip(&rows.metadata)
            .filter(|(_, m)| m.doc_id != doc_id)
            .map(|(v, m)| (v.clone(), m.clone()))
            .unzip();

        let removed = rows.vectors.len() - vectors.len();
        if self.config.auto_save {
            self.persist(&vectors, &metadata, rows.dimension).await?;
        }

        rows.vectors = vectors;
        rows.metadata = metadata;
        self.invalidate_index().await;
        tracing::debug!(
            kb_id = %self.config.kb_id,
            doc_id,
            removed,
            total = rows.vectors.len(),
            "removed document"
        );
        Ok(())
    }

    async fn get_num_vectors(&self) -> Result<usize, KbError> {
        Ok(self.rows.read().await.vectors.len())
    }

    async fn save(&self) -> Result<(), KbError> {
        let rows = self.rows.read().await;
        self.persist(&rows.vectors, &rows.metadata, rows.dimension)
            .await
    }

    /// Replaces in-memory rows with the snapshot; nothing is merged. A
    /// missing snapshot leaves the store as it is.
    async fn load(&self) -> Result<(), KbError> {
        let Some(snapshot) = persistence::read_snapshot(&self.storage_path).await? else {
            tracing::warn!(
                kb_id = %self.config.kb_id,
                path = %self.storage_path.display(),
                "no vector snapshot found; keeping current state"
            );
            return Ok(());
        };

        if snapshot.kb_id != self.config.kb_id {
            return Err(KbError::Serialization(format!(
                "snapshot at {} belongs to kb_id '{}', not '{}'",
                self.storage_path.display(),
                snapshot.kb_id,
                self.config.kb_id
            )));
        }

        let dimension = snapshot
            .dimension
            .or_else(|| snapshot.vectors.first().map(Vec::len))
            .or(self.config.dimension);
        if let (Some(configured), Some(stored)) = (self.config.dimension, dimension) {
            if configured != stored {
                return Err(KbError::Validation(format!(
                    "snapshot holds {stored}-dimensional vectors but the store is configured for {configured}"
                )));
            }
        }
        if let Some(d) = dimension {
            if let Some(i) = snapshot.vectors.iter().position(|v| v.len() != d) {
                return Err(KbError::Serialization(format!(
                    "corrupt snapshot {}: vector {i} does not have dimension {d}",
                    self.storage_path.display()
                )));
            }
        }

        let mut rows = self.rows.write().await;
        *rows = Rows {
            vectors: snapshot.vectors,
            metadata: snapshot.metadata,
            dimension,
        };
        self.invalidate_index().await;
        tracing::info!(
            kb_id = %self.config.kb_id,
            path = %self.storage_path.display(),
            rows = rows.vectors.len(),
            "loaded vector snapshot"
        );
        Ok(())
    }

    /// Removes the snapshot file. In-memory rows are left untouched.
    async fn delete(&self) -> Result<(), KbError> {
        let removed = persistence::remove_snapshot(&self.storage_path).await?;
        tracing::info!(
            kb_id = %self.config.kb_id,
            path = %self.storage_path.display(),
            removed,
            "deleted vector snapshot"
        );
        Ok(())
    }

    fn kb_id(&self) -> &str {
        &self.config.kb_id
    }

    fn backend_name(&self) -> &'static str {
        BASIC_VECTOR_DB
    }

    fn to_descriptor(&self) -> Value {
        let mut descriptor = serde_json::json!({
            "subclass_name": BASIC_VECTOR_DB,
            "kb_id": self.config.kb_id,
            "storage_directory": self.config.storage_directory,
            "use_index": self.search_strategy() == SearchStrategy::Index,
            "auto_save": self.config.auto_save,
        });
        if let (Some(dimension), Value::Object(map)) = (self.config.dimension, &mut descriptor) {
            map.insert("dimension".to_string(), dimension.into());
        }
        descriptor
    }
}
