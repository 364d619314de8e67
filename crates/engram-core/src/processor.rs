//! Content processing collaborators: embedding and summarization.
//!
//! The coordinator treats these as slow, fallible remote calls. Awaiting
//! happens outside any per-tenant lock, and `hybrid_search` degrades to
//! keyword-only retrieval when embedding fails or times out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from content-processing collaborators.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("embedding failed: {0}")]
    Embed(String),

    #[error("summarization failed: {0}")]
    Summarize(String),

    #[error("processor call exceeded {0:?}")]
    Timeout(Duration),
}

/// Embedding and summarization backend.
///
/// Implementations wrap a model API or local inference runtime. Every vector
/// returned by `embed` must have exactly `dimension()` components.
#[async_trait]
pub trait MemoryProcessor: Send + Sync {
    /// Embed one text into a dense vector of `dimension()` components.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProcessorError>;

    /// Condense a window of conversation turns into one summary text.
    async fn summarize(&self, turns: &[String]) -> Result<String, ProcessorError>;

    /// Dimension of every vector this processor produces.
    fn dimension(&self) -> usize;
}

/// Deterministic in-process stand-in for a real model backend.
///
/// Embeddings are derived from a SHA-256 stream over the input text, so the
/// same text always maps to the same vector and distinct texts land far
/// apart. Summaries concatenate the window. `set_fail` makes both calls
/// return errors, for exercising degraded retrieval paths.
pub struct StubProcessor {
    dim: usize,
    fail: AtomicBool,
}

impl StubProcessor {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            fail: AtomicBool::new(false),
        }
    }

    /// Toggle failure injection for subsequent calls.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn pseudo_embedding(&self, text: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dim);
        let mut chunk: u64 = 0;
        while out.len() < self.dim {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(chunk.to_le_bytes());
            let digest = hasher.finalize();
            for byte in digest.iter() {
                if out.len() == self.dim {
                    break;
                }
                out.push(f32::from(*byte) / 255.0 - 0.5);
            }
            chunk += 1;
        }
        out
    }
}

#[async_trait]
impl MemoryProcessor for StubProcessor {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProcessorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProcessorError::Embed("injected failure".into()));
        }
        Ok(self.pseudo_embedding(text))
    }

    async fn summarize(&self, turns: &[String]) -> Result<String, ProcessorError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProcessorError::Summarize("injected failure".into()));
        }
        Ok(format!("Summary of {} turns: {}", turns.len(), turns.join(" | ")))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embed_is_deterministic_with_exact_dimension() {
        let processor = StubProcessor::new(32);
        let a = processor.embed("I love cats").await.unwrap();
        let b = processor.embed("I love cats").await.unwrap();

        assert_eq!(a.len(), 32);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_distinct_texts_embed_differently() {
        let processor = StubProcessor::new(32);
        let a = processor.embed("I love cats").await.unwrap();
        let b = processor.embed("I live in Paris").await.unwrap();

        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_dimension_larger_than_one_digest() {
        // 768 spans many SHA-256 blocks; all components must be filled.
        let processor = StubProcessor::new(768);
        let v = processor.embed("x").await.unwrap();
        assert_eq!(v.len(), 768);
        assert!(v.iter().any(|c| *c != 0.0));
    }

    #[tokio::test]
    async fn test_summarize_mentions_window_size() {
        let processor = StubProcessor::new(8);
        let turns = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let summary = processor.summarize(&turns).await.unwrap();
        assert!(summary.contains("3 turns"));
        assert!(summary.contains('a') && summary.contains('c'));
    }

    #[tokio::test]
    async fn test_failure_injection_toggles() {
        let processor = StubProcessor::new(8);
        processor.set_fail(true);
        assert!(processor.embed("anything").await.is_err());
        assert!(processor.summarize(&[]).await.is_err());

        processor.set_fail(false);
        assert!(processor.embed("anything").await.is_ok());
    }
}
