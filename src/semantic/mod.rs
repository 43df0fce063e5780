//! Semantic search over the content catalog.
//!
//! This module provides local semantic search using fastembed-rs for
//! generating embeddings and an in-memory flat index for similarity search.
//!
//! # Architecture
//!
//! - `embeddings`: Encoder trait, fastembed model, lazy loading
//! - `index`: Positional vector index with inner-product search
//! - `storage`: vectors.bin + content.json snapshot persistence
//! - `preprocess`: Searchable text and description truncation
//! - `reason`: Score-based result explanations
//! - `service`: High-level build/search service

pub mod embeddings;
mod index;
mod preprocess;
mod reason;
mod service;
mod storage;

pub use embeddings::{is_supported_model, EmbeddingError, Encoder, LazyEncoder};
pub use service::{
    BuildResult, SearchResponse, SearchResult, SemanticSearchError, SemanticSearchService,
};
pub use storage::{CONTENT_FILE, VECTORS_FILE};

/// Default embedding model name
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
