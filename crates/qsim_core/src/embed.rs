use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{QsimError, Result};
use crate::providers::ProviderId;
use crate::vector::ensure_uniform_dimension;

/// Produces one vector per text. Every vector from one provider shares a
/// dimension.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<T> {
    fn provider(&self) -> ProviderId {
        (**self).provider()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub is_valid: bool,
    #[serde(default)]
    pub reason: String,
}

impl QualityVerdict {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            reason: reason.into(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: reason.into(),
        }
    }
}

/// Pass/fail judgment of a candidate question.
#[async_trait]
pub trait QualityJudge: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn judge(&self, text: &str) -> Result<QualityVerdict>;
}

#[async_trait]
impl<T: QualityJudge + ?Sized> QualityJudge for Arc<T> {
    fn provider(&self) -> ProviderId {
        (**self).provider()
    }

    async fn judge(&self, text: &str) -> Result<QualityVerdict> {
        (**self).judge(text).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Upper bound for the whole batch, not for each call.
    pub timeout: Duration,
    pub max_in_flight: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_in_flight: 8,
        }
    }
}

/// Embeds `texts` concurrently, keeping input order.
///
/// The first failing call, or the batch timeout, drops every call still in
/// flight; a partial batch is never returned. Blank texts are not sent to the
/// provider and come back as zero vectors, which score 0 against everything.
pub async fn embed_all<E>(
    embedder: &E,
    texts: &[String],
    options: &BatchOptions,
) -> Result<Vec<Vec<f32>>>
where
    E: EmbeddingProvider + ?Sized,
{
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let provider = embedder.provider();
    let pending: Vec<&str> = texts
        .iter()
        .map(String::as_str)
        .filter(|text| !is_blank(text))
        .collect();
    let blank = texts.len() - pending.len();
    if blank > 0 {
        warn!(%provider, blank, "blank texts in batch, using zero vectors");
    }
    debug!(%provider, count = pending.len(), "embedding batch");

    let batch = stream::iter(pending)
        .map(|text| embedder.embed(text))
        .buffered(options.max_in_flight.max(1))
        .try_collect::<Vec<_>>();

    let embedded = tokio::time::timeout(options.timeout, batch)
        .await
        .map_err(|_| {
            QsimError::provider_unavailable(
                provider,
                format!("embedding batch timed out after {:?}", options.timeout),
            )
        })??;

    let dim = ensure_uniform_dimension(&embedded)?;
    let mut embedded = embedded.into_iter();
    Ok(texts
        .iter()
        .map(|text| {
            if is_blank(text) {
                vec![0.0; dim]
            } else {
                embedded.next().unwrap_or_else(|| vec![0.0; dim])
            }
        })
        .collect())
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

/// Runs one quality judgment under `timeout`.
pub async fn judge_within<J>(judge: &J, text: &str, timeout: Duration) -> Result<QualityVerdict>
where
    J: QualityJudge + ?Sized,
{
    let provider = judge.provider();
    tokio::time::timeout(timeout, judge.judge(text))
        .await
        .map_err(|_| {
            QsimError::provider_unavailable(
                provider,
                format!("quality check timed out after {timeout:?}"),
            )
        })?
}


#[cfg(test)]
mod tests {
    use super::testing::FixedEmbeddings;
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn keeps_input_order() {
        let embedder = FixedEmbeddings::new([
            ("a", vec![1.0, 0.0]),
            ("b", vec![0.0, 1.0]),
            ("c", vec![1.0, 1.0]),
        ]);
        let options = BatchOptions {
            max_in_flight: 2,
            ..BatchOptions::default()
        };

        let vectors = embed_all(&embedder, &texts(&["c", "a", "b"]), &options)
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let embedder = FixedEmbeddings::default();
        let vectors = embed_all(&embedder, &[], &BatchOptions::default())
            .await
            .unwrap();
        assert!(vectors.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch() {
        let mut embedder = FixedEmbeddings::new([("a", vec![1.0]), ("b", vec![1.0])]);
        embedder.fail_on = Some("b".to_string());

        let err = embed_all(&embedder, &texts(&["a", "b"]), &BatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "provider_unavailable");
    }

    #[tokio::test]
    async fn blank_texts_become_zero_vectors_without_calls() {
        let embedder = FixedEmbeddings::new([("a", vec![1.0, 0.0]), ("b", vec![0.0, 1.0])]);

        let vectors = embed_all(&embedder, &texts(&["a", "", "b", "  "]), &BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(
            vectors,
            vec![vec![1.0, 0.0], vec![0.0, 0.0], vec![0.0, 1.0], vec![0.0, 0.0]]
        );
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_unavailable() {
        let mut embedder = FixedEmbeddings::new([("a", vec![1.0])]);
        embedder.delay = Some(Duration::from_secs(60));
        let options = BatchOptions {
            timeout: Duration::from_secs(1),
            max_in_flight: 4,
        };

        let err = embed_all(&embedder, &texts(&["a"]), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, QsimError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn inconsistent_dimensions_are_rejected() {
        let embedder = FixedEmbeddings::new([("a", vec![1.0, 0.0]), ("b", vec![1.0])]);
        let err = embed_all(&embedder, &texts(&["a", "b"]), &BatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "dimension_mismatch");
    }
}
