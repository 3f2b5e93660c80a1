use async_trait::async_trait;
use rand::Rng;
use rand::SeedableRng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::application::{EmbedRole, EmbeddingService};
use crate::domain::DomainError;

const MOCK_MODEL_ID: &str = "mock-embedding-v1";
const MOCK_DIMENSIONS: usize = 384;

/// Deterministic embedding stand-in for tests and offline demos: each token
/// hashes to a pseudo-random direction and the text embeds as the
/// normalized sum. Identical text always yields the identical unit vector,
/// and texts sharing tokens land measurably closer than unrelated ones.
pub struct MockEmbedding {
    dimensions: usize,
    model_id: String,
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self {
            dimensions: MOCK_DIMENSIONS,
            model_id: MOCK_MODEL_ID.to_string(),
        }
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_id: format!("{}-{}d", MOCK_MODEL_ID, dimensions),
        }
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let mut rng = rand::rngs::StdRng::seed_from_u64(hasher.finish());
            for x in vector.iter_mut() {
                *x += rng.gen_range(-1.0..1.0);
            }
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut vector {
                *x /= magnitude;
            }
        } else {
            // Empty text still embeds to a valid unit vector.
            vector[0] = 1.0;
        }
        vector
    }
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingService for MockEmbedding {
    async fn embed_batch(
        &self,
        texts: &[String],
        _role: EmbedRole,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        Ok(texts.iter().map(|t| self.generate(t)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let service = MockEmbedding::new();
        let a = service.embed("hello world", EmbedRole::Doc).await.unwrap();
        let b = service.embed("hello world", EmbedRole::Query).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_unit_norm() {
        let service = MockEmbedding::new();
        let v = service.embed("anything", EmbedRole::Doc).await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
        assert_eq!(v.len(), 384);
    }

    #[tokio::test]
    async fn shared_tokens_raise_similarity() {
        let service = MockEmbedding::new();
        let a = service.embed("get user score", EmbedRole::Query).await.unwrap();
        let b = service
            .embed("user score lookup", EmbedRole::Doc)
            .await
            .unwrap();
        let c = service
            .embed("unrelated payment gateway", EmbedRole::Doc)
            .await
            .unwrap();

        let sim = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(a, b)| a * b).sum::<f32>();
        assert!(sim(&a, &b) > sim(&a, &c));
    }

    #[tokio::test]
    async fn dimensions_are_configurable() {
        let service = MockEmbedding::with_dimensions(128);
        let v = service.embed("x", EmbedRole::Doc).await.unwrap();
        assert_eq!(v.len(), 128);
        assert_ne!(service.model_id(), MockEmbedding::new().model_id());
    }
}
