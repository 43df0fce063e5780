//! Semantic search service over the content catalog.
//!
//! Provides a high-level interface for semantic search operations:
//! - Builds the index from a full catalog, replacing whatever was served
//! - Answers top-k queries with category filtering and reasons
//! - Loads the persisted snapshot on startup and persists after each build
//!
//! The served index and its catalog live together in an immutable
//! `IndexSnapshot`. Readers clone an `Arc` to it and search without holding
//! any lock; a build constructs a complete new snapshot before swapping the
//! reference, so a query sees either the old or the new catalog.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

use crate::catalog::{Category, ContentItem, UnknownCategory};
use crate::config::SemanticSearchConfig;
use crate::semantic::embeddings::{l2_normalize, EmbeddingError, Encoder, LazyEncoder};
use crate::semantic::index::{IndexError, VectorIndex};
use crate::semantic::preprocess::{searchable_text, truncate_description};
use crate::semantic::reason::reason_for;
use crate::semantic::storage::{model_id_hash, SnapshotStorage, VectorStorageError};

/// Errors that can occur during semantic search operations.
#[derive(Debug, thiserror::Error)]
pub enum SemanticSearchError {
    #[error("Catalog is empty, nothing to index")]
    EmptyCatalog,

    #[error("Index has not been built yet, call index first")]
    IndexNotBuilt,

    #[error("Embedding model is not ready: {0}")]
    EncoderNotReady(String),

    #[error("Limit must be a positive integer")]
    InvalidLimit,

    #[error(transparent)]
    UnknownCategory(#[from] UnknownCategory),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildResult {
    pub indexed_count: usize,
    pub dimension: usize,
    /// False when the snapshot could not be written; the new index is
    /// served from memory regardless.
    pub persisted: bool,
}

/// A ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub item: ContentItem,
    pub score: f32,
    #[serde(rename = "neden")]
    pub reason: String,
}

/// Response shape shared by the HTTP and CLI front ends.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub query: String,
    pub total: usize,
}

impl SearchResponse {
    pub fn new(query: impl Into<String>, results: Vec<SearchResult>) -> Self {
        Self {
            total: results.len(),
            query: query.into(),
            results,
        }
    }
}

/// Index and catalog that were built together. Never mutated once served.
struct IndexSnapshot {
    index: VectorIndex,
    items: Vec<ContentItem>,
}

impl IndexSnapshot {
    /// Walk the `k` nearest neighbors in rank order, keeping at most `limit`
    /// that pass the category filter. Descriptions are cut to
    /// `description_limit` characters when one is given.
    fn collect(
        &self,
        query: &[f32],
        k: usize,
        limit: usize,
        category: Option<Category>,
        description_limit: Option<usize>,
    ) -> Result<Vec<SearchResult>, SemanticSearchError> {
        let mut results = Vec::with_capacity(limit);

        for neighbor in self.index.search(query, k)?.into_iter().flatten() {
            let Some(item) = self.items.get(neighbor.position) else {
                continue;
            };

            if category.is_some_and(|category| category != item.category) {
                continue;
            }

            let description = match description_limit {
                Some(max_chars) => truncate_description(&item.description, max_chars),
                None => item.description.clone(),
            };

            results.push(SearchResult {
                item: ContentItem {
                    description,
                    ..item.clone()
                },
                score: neighbor.score,
                reason: reason_for(item.category, neighbor.score),
            });

            if results.len() >= limit {
                break;
            }
        }

        Ok(results)
    }
}

/// Service for semantic search over the catalog.
///
/// Construct once at startup and share behind an `Arc`.
pub struct SemanticSearchService {
    config: SemanticSearchConfig,
    encoder: LazyEncoder,
    storage: SnapshotStorage,
    model_id: [u8; 32],
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    /// Serializes builds; the last one to finish is what gets served.
    build_lock: Mutex<()>,
}

impl SemanticSearchService {
    /// Create a service backed by the configured fastembed model.
    ///
    /// Nothing is loaded here: the model loads on first use and the snapshot
    /// on `initialize()`.
    ///
    /// # Arguments
    /// * `config` - Semantic search configuration
    /// * `base_path` - Base directory for data files (vectors.bin, content.json, models/)
    pub fn new(config: SemanticSearchConfig, base_path: PathBuf) -> Self {
        let encoder = LazyEncoder::fastembed(config.model.clone(), base_path.join("models"));
        Self::with_encoder(config, base_path, encoder)
    }

    /// Create a service with a custom encoder.
    pub fn with_encoder(
        config: SemanticSearchConfig,
        base_path: PathBuf,
        encoder: LazyEncoder,
    ) -> Self {
        Self {
            model_id: model_id_hash(&config.model),
            config,
            encoder,
            storage: SnapshotStorage::new(base_path),
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    /// Load the persisted snapshot, if there is a usable one.
    ///
    /// Missing, partial, mismatched or unreadable snapshots are logged and
    /// the service starts with nothing indexed. Returns the number of items
    /// now served.
    pub fn initialize(&self) -> Result<usize, SemanticSearchError> {
        if !self.storage.exists() {
            if self.storage.any_exists() {
                log::warn!("Index snapshot is incomplete, starting with an empty index");
            } else {
                log::info!("No existing index, starting fresh");
            }
            return Ok(0);
        }

        let (index, items) = match self.storage.load(&self.model_id) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("Failed to load index snapshot, starting with an empty index: {}", e);
                return Ok(0);
            }
        };

        if items.is_empty() {
            log::warn!("Index snapshot is empty, starting with an empty index");
            return Ok(0);
        }

        let count = items.len();
        self.swap(IndexSnapshot { index, items })?;
        log::info!("Loaded {} items from index snapshot", count);

        Ok(count)
    }

    /// Load the embedding model now instead of on the first request.
    pub fn warm_up(&self) -> Result<usize, SemanticSearchError> {
        Ok(self.encoder()?.dimensions())
    }

    /// Replace the served index with one built from `items`.
    ///
    /// The new index is served as soon as it is built. Persisting the
    /// snapshot happens before returning; a write failure is logged and
    /// reported in `BuildResult::persisted` but does not undo the swap.
    pub fn build(&self, items: Vec<ContentItem>) -> Result<BuildResult, SemanticSearchError> {
        if items.is_empty() {
            return Err(SemanticSearchError::EmptyCatalog);
        }

        let _build = self
            .build_lock
            .lock()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;

        let encoder = self.encoder()?;
        let texts: Vec<String> = items.iter().map(searchable_text).collect();

        log::info!(
            "Generating embeddings for {} items with '{}'",
            texts.len(),
            encoder.name()
        );
        let vectors = encoder.encode(&texts)?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))
            .into());
        }

        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(EmbeddingError::EmbeddingFailed(
                "encoder returned empty vectors".to_string(),
            )
            .into());
        }

        let mut index = VectorIndex::with_capacity(dimension, vectors.len());
        for mut vector in vectors {
            l2_normalize(&mut vector);
            index.push(&vector)?;
        }

        let snapshot = self.swap(IndexSnapshot { index, items })?;
        let indexed_count = snapshot.items.len();
        log::info!("Index built: {} items, {} dimensions", indexed_count, dimension);

        let persisted = match self
            .storage
            .save(&snapshot.index, &snapshot.items, &self.model_id)
        {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to persist index snapshot: {}", e);
                false
            }
        };

        Ok(BuildResult {
            indexed_count,
            dimension,
            persisted,
        })
    }

    /// Search for catalog items similar to `query`.
    ///
    /// Returns at most `limit` results, best first, with descriptions cut to
    /// the configured length.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        category: Option<Category>,
    ) -> Result<Vec<SearchResult>, SemanticSearchError> {
        self.retrieve(
            query,
            limit,
            category,
            self.config.search_overfetch,
            Some(self.config.description_limit),
        )
    }

    /// Like `search()` with the wider recommendation over-fetch. Items are
    /// returned whole, descriptions included.
    pub fn recommend(
        &self,
        query: &str,
        limit: usize,
        category: Option<Category>,
    ) -> Result<Vec<SearchResult>, SemanticSearchError> {
        self.retrieve(
            query,
            limit,
            category,
            self.config.recommend_overfetch,
            None,
        )
    }

    /// Raw encoder output for `text`. Debugging aid, does not touch the index.
    pub fn embed_probe(&self, text: &str) -> Result<Vec<f32>, SemanticSearchError> {
        Ok(self.encoder()?.encode_one(text)?)
    }

    /// Get the number of indexed items. Returns 0 if nothing is built.
    pub fn indexed_count(&self) -> usize {
        self.current()
            .ok()
            .flatten()
            .map(|snapshot| snapshot.items.len())
            .unwrap_or(0)
    }

    pub fn is_model_loaded(&self) -> bool {
        self.encoder.is_loaded()
    }

    fn retrieve(
        &self,
        query: &str,
        limit: usize,
        category: Option<Category>,
        overfetch: usize,
        description_limit: Option<usize>,
    ) -> Result<Vec<SearchResult>, SemanticSearchError> {
        if limit == 0 {
            return Err(SemanticSearchError::InvalidLimit);
        }

        let snapshot = self
            .current()?
            .filter(|snapshot| !snapshot.index.is_empty())
            .ok_or(SemanticSearchError::IndexNotBuilt)?;

        let mut query_vector = self.encoder()?.encode_one(query)?;
        l2_normalize(&mut query_vector);

        let total = snapshot.items.len();
        let k = limit.saturating_mul(overfetch.max(1)).min(total);

        let results = snapshot.collect(&query_vector, k, limit, category, description_limit)?;

        // The filter can eat the whole over-fetch window; fall back to
        // ranking the full catalog before returning a short page.
        if category.is_some() && results.len() < limit && k < total {
            return snapshot.collect(&query_vector, total, limit, category, description_limit);
        }

        Ok(results)
    }

    fn encoder(&self) -> Result<Arc<dyn Encoder>, SemanticSearchError> {
        self.encoder.get().map_err(|e| {
            log::error!("Embedding model unavailable: {}", e);
            SemanticSearchError::EncoderNotReady(e.to_string())
        })
    }

    fn current(&self) -> Result<Option<Arc<IndexSnapshot>>, SemanticSearchError> {
        self.snapshot
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))
    }

    fn swap(&self, snapshot: IndexSnapshot) -> Result<Arc<IndexSnapshot>, SemanticSearchError> {
        let snapshot = Arc::new(snapshot);
        let mut guard = self
            .snapshot
            .write()
            .map_err(|e| SemanticSearchError::Internal(format!("Lock poisoned: {}", e)))?;
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SemanticSearchConfig {
        SemanticSearchConfig {
            model: "all-MiniLM-L6-v2".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_not_built_initially() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticSearchService::new(test_config(), dir.path().to_path_buf());

        assert_eq!(service.indexed_count(), 0);
        assert!(!service.is_model_loaded());
    }

    #[test]
    fn test_empty_catalog_rejected_before_model_load() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticSearchService::new(test_config(), dir.path().to_path_buf());

        let result = service.build(vec![]);
        assert!(matches!(result, Err(SemanticSearchError::EmptyCatalog)));
        assert!(!service.is_model_loaded());
    }

    #[test]
    fn test_search_before_build_fails() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticSearchService::new(test_config(), dir.path().to_path_buf());

        let result = service.search("anything", 5, None);
        assert!(matches!(result, Err(SemanticSearchError::IndexNotBuilt)));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticSearchService::new(test_config(), dir.path().to_path_buf());

        let result = service.search("anything", 0, None);
        assert!(matches!(result, Err(SemanticSearchError::InvalidLimit)));
    }

    #[test]
    fn test_initialize_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticSearchService::new(test_config(), dir.path().to_path_buf());

        assert_eq!(service.initialize().unwrap(), 0);
        assert_eq!(service.indexed_count(), 0);
    }

    #[test]
    fn test_unknown_model_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let config = SemanticSearchConfig {
            model: "no-such-model".to_string(),
            ..Default::default()
        };
        let service = SemanticSearchService::new(config, dir.path().to_path_buf());

        let result = service.embed_probe("text");
        assert!(matches!(result, Err(SemanticSearchError::EncoderNotReady(_))));
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_build_and_search_integration() {
        let dir = tempfile::tempdir().unwrap();
        let service = SemanticSearchService::new(test_config(), dir.path().to_path_buf());

        let items = vec![
            ContentItem {
                id: 1,
                title: "Interstellar".to_string(),
                category: Category::Film,
                description: "Astronauts travel through a wormhole to save humanity".to_string(),
                year: Some(2014),
                poster_url: None,
                rating: Some(8.7),
            },
            ContentItem {
                id: 2,
                title: "The Joy of Cooking".to_string(),
                category: Category::Book,
                description: "Classic recipes for home cooks".to_string(),
                year: Some(1931),
                poster_url: None,
                rating: None,
            },
        ];

        let built = service.build(items).unwrap();
        assert_eq!(built.indexed_count, 2);
        assert_eq!(built.dimension, 384);
        assert!(built.persisted);

        let results = service.search("space exploration movie", 1, None).unwrap();
        assert_eq!(results[0].item.id, 1);
    }
}
