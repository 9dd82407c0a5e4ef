use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{EvolutionError, Result};

/// Maps text to a dense vector.
///
/// Vectors produced by one embedder must all have the same dimension.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

impl<F> Embedder for F
where
    F: Fn(&str) -> Result<Vec<f32>> + Send + Sync,
{
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self(text)
    }
}

/// Deterministic bag-of-words embedder based on feature hashing.
///
/// Every lowercase word and every pair of adjacent words is hashed into one of `dimension`
/// buckets with a hash-derived sign, and the result is L2-normalized. Texts sharing
/// vocabulary end up close in cosine distance, which is enough for grouping distilled ideas
/// when no embedding model is available.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EvolutionError::Configuration(
                "Embedding dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let hash = hasher.finish();
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        ((hash % self.dimension as u64) as usize, sign)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimension: 256 }
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Err(EvolutionError::Embedding(
                "Cannot embed text without words".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for word in &words {
            let (idx, sign) = self.bucket(word);
            vector[idx] += sign;
        }
        for pair in words.windows(2) {
            let (idx, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[idx] += 0.5 * sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("Exponential decay term").unwrap();
        let b = embedder.embed("exponential DECAY term").unwrap();

        assert_eq!(a.len(), 256);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(128).unwrap();
        let base = embedder.embed("logistic growth with carrying capacity").unwrap();
        let near = embedder.embed("logistic growth capacity limit").unwrap();
        let far = embedder.embed("fourier series of periodic forcing").unwrap();

        assert!(cosine(&base, &near) > cosine(&base, &far));
    }

    #[test]
    fn test_empty_text_is_an_error() {
        let embedder = HashingEmbedder::default();
        assert!(embedder.embed("  -- ").is_err());
        assert!(HashingEmbedder::new(0).is_err());
    }
}
