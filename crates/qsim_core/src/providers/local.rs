use async_trait::async_trait;

use crate::embed::{EmbeddingProvider, QualityJudge, QualityVerdict};
use crate::error::Result;
use crate::providers::ProviderId;
use crate::settings::DEFAULT_EMBEDDING_DIM;
use crate::vector::normalize;

/// Offline bag-of-words embedding: each lowercase token is FNV-hashed into one
/// of `dim` buckets and the counts are scaled to unit length.
#[derive(Debug, Clone)]
pub struct LocalHashEmbedding {
    dim: usize,
}

impl LocalHashEmbedding {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];

        for token in tokens(text) {
            let mut h: u64 = 1469598103934665603;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            let idx = (h as usize) % self.dim;
            v[idx] += 1.0;
        }

        normalize(&mut v);
        v
    }
}

impl Default for LocalHashEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalHashEmbedding {
    fn provider(&self) -> ProviderId {
        ProviderId::Local
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Rule-based stand-in for a reasoning model: a question needs a minimum
/// number of words and at least one letter.
#[derive(Debug, Clone)]
pub struct HeuristicJudge {
    pub min_words: usize,
}

impl Default for HeuristicJudge {
    fn default() -> Self {
        Self { min_words: 3 }
    }
}

impl HeuristicJudge {
    pub fn verdict(&self, text: &str) -> QualityVerdict {
        let text = text.trim();
        if !text.chars().any(char::is_alphabetic) {
            return QualityVerdict::rejected("The question contains no words.");
        }

        let words = tokens(text).count();
        if words < self.min_words {
            return QualityVerdict::rejected(format!(
                "The question is too short to be complete ({words} of at least {} words).",
                self.min_words
            ));
        }

        QualityVerdict::valid("The question looks complete.")
    }
}

#[async_trait]
impl QualityJudge for HeuristicJudge {
    fn provider(&self) -> ProviderId {
        ProviderId::Local
    }

    async fn judge(&self, text: &str) -> Result<QualityVerdict> {
        Ok(self.verdict(text))
    }
}
