//! Model-free feature-hashing embedder.

use crate::embedding::Embedder;
use crate::error::EngineResult;
use crate::vector::{VectorDimension, normalize_vector};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hashes lowercase words into signed buckets and L2-normalizes the result.
///
/// Texts sharing words land close together under cosine distance. There is
/// no notion of synonyms, so this is a baseline rather than a semantic model.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: VectorDimension,
    name: String,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            name: format!("hash-{dimension}"),
        }
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> EngineResult<Vec<f32>> {
        let dim = self.dimension.get();
        let mut vector = vec![0.0f32; dim];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = fnv1a(&word.to_lowercase());
            let bucket = (hash % dim as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize_vector(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes()
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}
