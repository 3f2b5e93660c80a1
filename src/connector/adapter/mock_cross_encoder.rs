use async_trait::async_trait;

use crate::application::CrossEncoder;
use crate::domain::DomainError;

/// Deterministic cross-encoder stand-in: scores by lowercase word overlap
/// between query and document.
pub struct MockCrossEncoder;

impl MockCrossEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockCrossEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrossEncoder for MockCrossEncoder {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, DomainError> {
        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        Ok(documents
            .iter()
            .map(|doc| {
                let doc_lower = doc.to_lowercase();
                let hits = query_words.iter().filter(|w| doc_lower.contains(*w)).count();
                hits as f32 / query_words.len().max(1) as f32
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-cross-encoder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overlap_scores_are_ordered() {
        let encoder = MockCrossEncoder::new();
        let docs = vec![
            "user score lookup".to_string(),
            "unrelated payment handler".to_string(),
        ];
        let scores = encoder.score("user score", &docs).await.unwrap();
        assert!(scores[0] > scores[1]);
    }
}
