//! Embedding encoders.
//!
//! - `Encoder`: the seam the search service encodes through
//! - `EmbeddingModel`: fastembed-backed encoder, model downloaded on first use
//! - `LazyEncoder`: loads an encoder once on first use and memoizes it
//! - `l2_normalize`: unit-length scaling applied to every stored vector

use fastembed::{InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Maps text to fixed-dimension dense vectors.
///
/// Implementations return exactly one vector per input, in input order,
/// and must accept empty strings.
pub trait Encoder: Send + Sync {
    fn name(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn encode_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.encode(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }
}

/// Wrapper around fastembed's TextEmbedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
pub struct EmbeddingModel {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl EmbeddingModel {
    /// Create a new embedding model with the given name.
    ///
    /// The model is downloaded into `cache_dir` if not cached yet.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model_enum = parse_model_name(model_name)?;

        std::fs::create_dir_all(&cache_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(cache_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = Self::probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// Probe the model to determine embedding dimensions.
    fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, EmbeddingError> {
        let test_embeddings = model
            .embed(vec!["test"], None)
            .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

        test_embeddings
            .first()
            .map(|v| v.len())
            .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
    }
}

impl Encoder for EmbeddingModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

/// Check whether `name` is a model `EmbeddingModel` can load.
pub fn is_supported_model(name: &str) -> bool {
    parse_model_name(name).is_ok()
}

/// Parse model name string to fastembed enum.
fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-small-en-v1.5-q" | "bgesmallenv15q" => Ok(fastembed::EmbeddingModel::BGESmallENV15Q),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-base-en-v1.5-q" | "bgebaseenv15q" => Ok(fastembed::EmbeddingModel::BGEBaseENV15Q),
        "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "bge-large-en-v1.5-q" | "bgelargeenv15q" => Ok(fastembed::EmbeddingModel::BGELargeENV15Q),
        _ => Err(EmbeddingError::InvalidModel(format!(
            "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5 (add -q suffix for quantized)",
            name
        ))),
    }
}

pub type EncoderLoader =
    Box<dyn Fn() -> Result<Arc<dyn Encoder>, EmbeddingError> + Send + Sync>;

/// Encoder that is loaded on first use and kept for the process lifetime.
///
/// A failed load is not retried in the background: the next call to
/// `get()` tries once more.
pub struct LazyEncoder {
    loader: EncoderLoader,
    loaded: Mutex<Option<Arc<dyn Encoder>>>,
    /// Set once `loaded` holds an encoder; readable while a load is running.
    ready: AtomicBool,
}

impl LazyEncoder {
    pub fn new(loader: EncoderLoader) -> Self {
        Self {
            loader,
            loaded: Mutex::new(None),
            ready: AtomicBool::new(false),
        }
    }

    /// Lazy fastembed model stored under `cache_dir`.
    pub fn fastembed(model_name: String, cache_dir: PathBuf) -> Self {
        Self::new(Box::new(move || {
            log::info!("Loading embedding model '{}'", model_name);
            let model = EmbeddingModel::new(&model_name, cache_dir.clone())?;
            log::info!(
                "Embedding model '{}' loaded ({} dimensions)",
                model_name,
                model.dimensions()
            );
            Ok(Arc::new(model) as Arc<dyn Encoder>)
        }))
    }

    /// Return the loaded encoder, loading it if this is the first use.
    ///
    /// The lock is held during loading so concurrent first callers wait for
    /// one load instead of starting their own.
    pub fn get(&self) -> Result<Arc<dyn Encoder>, EmbeddingError> {
        let mut guard = self
            .loaded
            .lock()
            .map_err(|e| EmbeddingError::InitFailed(format!("Encoder lock poisoned: {}", e)))?;

        if let Some(encoder) = guard.as_ref() {
            return Ok(encoder.clone());
        }

        let encoder = (self.loader)()?;
        *guard = Some(encoder.clone());
        self.ready.store(true, Ordering::Release);
        Ok(encoder)
    }

    /// Whether a load has completed. Never waits for a load in progress.
    pub fn is_loaded(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

/// Scale `vector` to unit length in place.
///
/// A zero (or non-finite) vector has no direction; it is left as all zeros
/// so it scores 0 against everything instead of producing NaN.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();

    if !norm.is_finite() {
        vector.iter_mut().for_each(|x| *x = 0.0);
    } else if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}
