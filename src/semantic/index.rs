//! In-memory flat vector index with inner-product search.
//!
//! Vectors are addressed by position, in insertion order, so position `i`
//! lines up with item `i` of the catalog the index was built from. The index
//! only grows; a rebuild creates a new one.

/// Search hit from the vector index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the vector in insertion order
    pub position: usize,
    /// Inner product with the query (cosine similarity for unit vectors)
    pub score: f32,
}

/// Flat index over fixed-dimension vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    count: usize,
    /// `count * dimensions` values, one vector after another
    data: Vec<f32>,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    #[cfg(test)]
    pub fn new(dimensions: usize) -> Self {
        Self::with_capacity(dimensions, 0)
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            dimensions,
            count: 0,
            data: Vec::with_capacity(dimensions * capacity),
        }
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of vectors in the index.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append a vector at the next position.
    pub fn push(&mut self, embedding: &[f32]) -> Result<(), IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        self.data.extend_from_slice(embedding);
        self.count += 1;
        Ok(())
    }

    /// Get the vector stored at `position`.
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        if position >= self.count {
            return None;
        }
        let start = position * self.dimensions;
        Some(&self.data[start..start + self.dimensions])
    }

    /// Iterate over all vectors in position order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.count).filter_map(move |position| self.get(position))
    }

    /// Find the `k` vectors with the highest inner product with `query`.
    ///
    /// Always returns exactly `k` slots, best first; ties keep insertion
    /// order. When `k` exceeds the number of vectors the trailing slots are
    /// `None`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Option<Neighbor>>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .iter()
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                score: inner_product(query, vector),
            })
            .collect();

        // stable sort, equal scores stay in position order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut results: Vec<Option<Neighbor>> = scored.into_iter().take(k).map(Some).collect();
        results.resize(k, None);

        Ok(results)
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    // -0.0 and 0.0 must tie so position decides
    if dot == 0.0 {
        0.0
    } else {
        dot
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
