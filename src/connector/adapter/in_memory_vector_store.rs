use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::{ScoredPoint, VectorPoint, VectorStore};
use crate::domain::DomainError;

#[derive(Default)]
struct Collection {
    dim: usize,
    points: HashMap<String, VectorPoint>,
}

/// Brute-force cosine vector store kept entirely in memory. Used by tests
/// and fast local experiments; semantics mirror the DuckDB adapter.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<bool, DomainError> {
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(existing) if existing.dim == dim => Ok(false),
            Some(_) => {
                collections.insert(
                    name.to_string(),
                    Collection {
                        dim,
                        points: HashMap::new(),
                    },
                );
                Ok(true)
            }
            None => {
                collections.insert(
                    name.to_string(),
                    Collection {
                        dim,
                        points: HashMap::new(),
                    },
                );
                Ok(false)
            }
        }
    }

    async fn collection_dim(&self, name: &str) -> Result<Option<usize>, DomainError> {
        Ok(self.collections.read().await.get(name).map(|c| c.dim))
    }

    async fn drop_collection(&self, name: &str) -> Result<(), DomainError> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: &[VectorPoint]) -> Result<(), DomainError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| DomainError::not_indexed(format!("collection {} does not exist", name)))?;
        for point in points {
            if point.vector.len() != collection.dim {
                return Err(DomainError::dimension_mismatch(format!(
                    "expected dimension {}, got {}",
                    collection.dim,
                    point.vector.len()
                )));
            }
            collection
                .points
                .insert(point.chunk_id.clone(), point.clone());
        }
        Ok(())
    }

    async fn delete(&self, name: &str, chunk_ids: &[String]) -> Result<(), DomainError> {
        if let Some(collection) = self.collections.write().await.get_mut(name) {
            for id in chunk_ids {
                collection.points.remove(id);
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredPoint>, DomainError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| DomainError::not_indexed(format!("collection {} does not exist", name)))?;
        if vector.len() != collection.dim {
            return Err(DomainError::dimension_mismatch(format!(
                "query vector dimension {} does not match collection dimension {}",
                vector.len(),
                collection.dim
            )));
        }

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .values()
            .map(|p| ScoredPoint {
                chunk_id: p.chunk_id.clone(),
                similarity: cosine(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    async fn list_ids(&self, name: &str) -> Result<Vec<String>, DomainError> {
        Ok(self
            .collections
            .read()
            .await
            .get(name)
            .map(|c| c.points.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn count(&self, name: &str) -> Result<u64, DomainError> {
        Ok(self
            .collections
            .read()
            .await
            .get(name)
            .map(|c| c.points.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ChunkKind};

    fn point(id: &str, vector: Vec<f32>) -> VectorPoint {
        VectorPoint {
            chunk_id: id.to_string(),
            vector,
            payload: Chunk::new("repo", "a.js", 1, 5, id, ChunkKind::Function, "h", 50),
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store
            .upsert("c", &[point("x", vec![1.0, 0.0]), point("y", vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = store.search("c", &[0.9, 0.1], 2).await.unwrap();
        assert_eq!(hits[0].chunk_id, "x");
    }

    #[tokio::test]
    async fn dimension_reset_clears_points() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("c", 2).await.unwrap();
        store.upsert("c", &[point("x", vec![1.0, 0.0])]).await.unwrap();

        assert!(store.ensure_collection("c", 4).await.unwrap());
        assert_eq!(store.count("c").await.unwrap(), 0);
    }
}
