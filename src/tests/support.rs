//! Deterministic encoder and fixtures shared by the service tests.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::catalog::{Category, ContentItem};
use crate::config::SemanticSearchConfig;
use crate::semantic::{EmbeddingError, Encoder, LazyEncoder, SemanticSearchService};

pub const HASH_DIMENSIONS: usize = 1024;

/// Bag-of-words encoder: each lowercase alphanumeric token adds 1.0 to the
/// bucket picked by its FNV-1a hash.
pub struct HashingEncoder;

impl HashingEncoder {
    fn bucket(token: &str) -> usize {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % HASH_DIMENSIONS as u64) as usize
    }
}

impl Encoder for HashingEncoder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimensions(&self) -> usize {
        HASH_DIMENSIONS
    }

    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; HASH_DIMENSIONS];
                for token in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|token| !token.is_empty())
                {
                    vector[Self::bucket(&token.to_lowercase())] += 1.0;
                }
                vector
            })
            .collect())
    }
}

pub fn hashing_encoder() -> LazyEncoder {
    LazyEncoder::new(Box::new(|| Ok(Arc::new(HashingEncoder) as Arc<dyn Encoder>)))
}

/// Encoder whose first `failures` loads fail.
pub fn flaky_encoder(failures: usize) -> (LazyEncoder, Arc<AtomicUsize>) {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();

    let encoder = LazyEncoder::new(Box::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) < failures {
            Err(EmbeddingError::InitFailed("model unavailable".to_string()))
        } else {
            Ok(Arc::new(HashingEncoder) as Arc<dyn Encoder>)
        }
    }));

    (encoder, attempts)
}

/// Encoder whose load signals `started` and then waits until `release`
/// receives a message.
pub fn gated_encoder() -> (LazyEncoder, Receiver<()>, Sender<()>) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    let encoder = LazyEncoder::new(Box::new(move || {
        started_tx.lock().unwrap().send(()).unwrap();
        release_rx.lock().unwrap().recv().unwrap();
        Ok(Arc::new(HashingEncoder) as Arc<dyn Encoder>)
    }));

    (encoder, started_rx, release_tx)
}

pub fn test_config() -> SemanticSearchConfig {
    SemanticSearchConfig::default()
}

pub fn test_service(base_path: &Path) -> SemanticSearchService {
    SemanticSearchService::with_encoder(test_config(), base_path.to_path_buf(), hashing_encoder())
}

pub fn item(id: i64, category: Category, title: &str, description: &str) -> ContentItem {
    ContentItem {
        id,
        title: title.to_string(),
        category,
        description: description.to_string(),
        year: None,
        poster_url: None,
        rating: None,
    }
}

/// The three item catalog: two hero stories in different categories and an
/// unrelated film.
pub fn hero_catalog() -> Vec<ContentItem> {
    vec![
        item(1, Category::Film, "X", "a hero story"),
        item(2, Category::Book, "Y", "a hero story"),
        item(3, Category::Film, "Z", "totally unrelated topic"),
    ]
}

pub fn mixed_catalog() -> Vec<ContentItem> {
    vec![
        item(10, Category::Film, "Interstellar", "astronauts travel through a wormhole in space"),
        item(11, Category::Series, "Night City", "a detective solves a murder mystery"),
        item(12, Category::Book, "Dune", "an epic desert planet of sand"),
        item(13, Category::Film, "Galaxy War", "ships fight in space"),
        item(14, Category::Book, "Home Cooking", "classic recipes for home cooks"),
        item(15, Category::Series, "Dragon Knight", "a knight with a sword and a dragon"),
        item(16, Category::Film, "Crime Night", "a crime mystery in the city at night"),
        item(17, Category::Book, "Love Novel", "a romance novel about love"),
    ]
}
