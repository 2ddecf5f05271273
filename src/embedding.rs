//! Embedding provider capability (`spec.md` §9 "Polymorphism over
//! connectors / embedding providers").
//!
//! Invocation of an actual embedding model is explicitly out of scope;
//! callers inject an implementation of [`EmbeddingProvider`]. The stub here
//! (grounded on the hash-trick deterministic encoder used for tests
//! elsewhere in the retrieval stack) exists only for tests and examples.

use crate::error::{EngramError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Maps text to a fixed-dimension real vector. Calls are awaitable and
/// timeout-bounded; implementations should be deterministic for a fixed
/// model version and unchanged input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of vectors this provider returns.
    fn dimension(&self) -> usize;
}

/// Apply a timeout to any [`EmbeddingProvider::embed`] call, converting a
/// timeout into [`EngramError::EmbeddingTimeout`].
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(EngramError::EmbeddingTimeout(timeout)),
    }
}

/// Deterministic hash-trick embedder for tests: folds byte values of the
/// input into a fixed-dimension vector and L2-normalizes it. Never calls
/// out to a real model.
pub struct StubEmbedder {
    dim: usize,
}

impl StubEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            v[i % self.dim] += byte as f32;
        }
        Ok(crate::vector::normalize(&v))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_embedder_is_deterministic() {
        let e = StubEmbedder::new(16);
        let a = e.embed("hello world").await.unwrap();
        let b = e.embed("hello world").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[tokio::test]
    async fn embed_with_timeout_surfaces_timeout_error() {
        struct Slow;
        #[async_trait]
        impl EmbeddingProvider for Slow {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(vec![0.0])
            }
            fn dimension(&self) -> usize {
                1
            }
        }

        let err = embed_with_timeout(&Slow, "x", Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::EmbeddingTimeout(_)));
    }
}
