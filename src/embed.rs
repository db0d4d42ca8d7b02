//! Embedding providers.
//!
//! Stores only ever see the [`Embedder`] trait. `HashEmbedder` is a
//! deterministic feature-hashing model that needs no downloads; with the
//! `fastembed` feature, `FastEmbedder` runs all-MiniLM-L6-v2 locally.

use thiserror::Error;

#[cfg(feature = "fastembed")]
pub use self::fast::FastEmbedder;

/// Dimension of all-MiniLM-L6-v2, the reference model.
pub const DEFAULT_DIMENSION: usize = 384;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not load embedding model: {0}")]
    Model(String),
    #[error("embedding failed: {0}")]
    Inference(String),
    #[error("provider returned {found} embeddings for {expected} texts")]
    Count { expected: usize, found: usize },
    #[error("embedding has {found} dimensions, expected {expected}")]
    Dimension { expected: usize, found: usize },
}

pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// Embeds every text, in order. Vectors are expected to be unit length
    /// so that a dot product is a cosine similarity.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, Error>;
}

/// Calls the provider and checks that it returned one vector of the
/// expected dimension per text.
pub fn embed_checked(
    embedder: &dyn Embedder,
    texts: &[&str],
    dimension: usize,
) -> Result<Vec<Vec<f32>>, Error> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let vectors = embedder.embed(texts)?;
    if vectors.len() != texts.len() {
        return Err(Error::Count {
            expected: texts.len(),
            found: vectors.len(),
        });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(Error::Dimension {
            expected: dimension,
            found: bad.len(),
        });
    }
    Ok(vectors)
}

#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a feature hashing over lowercase alphanumeric words.
///
/// Each word adds ±1 to one bucket chosen by its hash, and the result is
/// L2-normalized. Texts sharing words score high, which is enough for the
/// rerank to tell `Disk SanDisk failed` from `Disk Kingston failed`.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = fnv1a(&word.to_lowercase());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = dot(&vector, &vector).sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, Error> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(feature = "fastembed")]
mod fast {
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    use super::{Embedder, Error, DEFAULT_DIMENSION};

    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedder {
        /// Loads all-MiniLM-L6-v2, downloading it on first use.
        pub fn new() -> Result<Self, Error> {
            let model = TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
                .map_err(|e| Error::Model(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn dimension(&self) -> usize {
            DEFAULT_DIMENSION
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, Error> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| Error::Inference("embedding model lock poisoned".to_string()))?;
            model
                .embed(texts.to_vec(), None)
                .map_err(|e| Error::Inference(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_vectors_are_unit_length() {
        let embedder = HashEmbedder::new(64);
        let vectors = embedder.embed(&["Disk SanDisk failed", ""]).unwrap();
        assert_eq!(vectors[0].len(), 64);
        assert!((dot(&vectors[0], &vectors[0]) - 1.0).abs() < 1e-5);
        assert!(vectors[1].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_words_score_higher() {
        let embedder = HashEmbedder::default();
        let v = embedder
            .embed(&["SanDisk disk failure", "Disk SanDisk failed", "Disk Kingston failed"])
            .unwrap();
        assert!(dot(&v[0], &v[1]) > dot(&v[0], &v[2]));
    }

    #[test]
    fn case_does_not_matter() {
        let embedder = HashEmbedder::default();
        let v = embedder.embed(&["DISK error", "disk ERROR"]).unwrap();
        assert!((dot(&v[0], &v[1]) - 1.0).abs() < 1e-5);
    }

    struct Short;

    impl Embedder for Short {
        fn dimension(&self) -> usize {
            3
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, Error> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[test]
    fn checked_embedding_rejects_wrong_dimension() {
        match embed_checked(&Short, &["a"], 3) {
            Err(Error::Dimension { expected, found }) => assert_eq!((expected, found), (3, 2)),
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
        assert!(embed_checked(&Short, &[], 3).unwrap().is_empty());
    }
}
