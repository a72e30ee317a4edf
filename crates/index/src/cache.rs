use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::embeddings::Embedder;

/// Memoizes another embedder. The same KG row matched by several query
/// triples renders to the same evidence line, so dedup hits this often.
pub struct CachedEmbedder<E> {
    inner: E,
    embeddings: DashMap<String, Vec<f32>>,
    max_entries: usize,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E, max_entries: usize) -> Self {
        Self {
            inner,
            embeddings: DashMap::new(),
            max_entries,
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = hash_text(text);
        self.embeddings.get(&key).map(|r| r.value().clone())
    }

    fn set(&self, text: &str, embedding: Vec<f32>) {
        if self.max_entries == 0 {
            return;
        }
        if self.embeddings.len() >= self.max_entries {
            // Simple eviction: clear 25% when full
            let to_remove: Vec<_> = self.embeddings.iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.embeddings.remove(&key);
            }
        }
        self.embeddings.insert(hash_text(text), embedding);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            embeddings_cached: self.embeddings.len(),
        }
    }

    pub fn clear(&self) {
        self.embeddings.clear();
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachedEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.get(text) {
            return Ok(hit);
        }
        let embedding = self.inner.embed(text).await?;
        self.set(text, embedding.clone());
        Ok(embedding)
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub embeddings_cached: usize,
}
