use tracing::debug;

use crate::embed::{embed_all, BatchOptions, EmbeddingProvider, QualityJudge};
use crate::error::{QsimError, Result};
use crate::model::Record;
use crate::text::clean_html;
use crate::vector::cosine_similarity;

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// Nothing to compare against; no provider call was made.
    EmptyCorpus,
    /// Records at or above the threshold, in corpus order. May be empty.
    Matches(Vec<Record>),
}

/// Indices and scores of corpus vectors whose similarity to `query` is at
/// least `threshold`, in corpus order.
pub fn score_matches<V: AsRef<[f32]>>(
    query: &[f32],
    corpus: &[V],
    threshold: f32,
) -> Result<Vec<(usize, f32)>> {
    if let Some(found) = corpus
        .iter()
        .map(|v| v.as_ref().len())
        .find(|len| *len != query.len())
    {
        return Err(QsimError::DimensionMismatch {
            expected: query.len(),
            found,
        });
    }

    Ok(corpus
        .iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(query, v.as_ref())))
        .filter(|(_, score)| *score >= threshold)
        .collect())
}

/// Returns every corpus record whose question is at least `threshold`
/// similar to `query`.
///
/// When a judge is given, the query is checked before anything is embedded.
/// The query and all corpus questions go out as one concurrent batch on the
/// same embedder.
pub async fn find_matches(
    query: &str,
    corpus: &[Record],
    embedder: &dyn EmbeddingProvider,
    judge: Option<&dyn QualityJudge>,
    threshold: f32,
    options: &BatchOptions,
) -> Result<MatchOutcome> {
    if corpus.is_empty() {
        return Ok(MatchOutcome::EmptyCorpus);
    }

    if let Some(judge) = judge {
        let verdict = crate::embed::judge_within(judge, query, options.timeout).await?;
        if !verdict.is_valid {
            return Err(QsimError::PoorQualityInput {
                reason: verdict.reason,
            });
        }
    }

    let mut texts = Vec::with_capacity(corpus.len() + 1);
    texts.push(query.to_string());
    texts.extend(corpus.iter().map(|r| clean_html(&r.question)));

    let mut vectors = embed_all(embedder, &texts, options).await?;
    let corpus_vectors = vectors.split_off(1);
    let query_vector = &vectors[0];

    let scored = score_matches(query_vector, &corpus_vectors, threshold)?;
    debug!(
        corpus = corpus.len(),
        matched = scored.len(),
        best = scored.iter().map(|(_, s)| *s).fold(f32::NAN, f32::max),
        "scored corpus"
    );

    Ok(MatchOutcome::Matches(
        scored.into_iter().map(|(i, _)| corpus[i].clone()).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::{FixedEmbeddings, FixedVerdict};
    use crate::embed::QualityVerdict;
    use crate::providers::LocalHashEmbedding;

    fn corpus() -> Vec<Record> {
        vec![
            Record::new("A", "a"),
            Record::new("B", "b"),
            Record::new("C", "c"),
        ]
    }

    fn embedder() -> FixedEmbeddings {
        FixedEmbeddings::new([
            ("query", vec![1.0, 0.0]),
            ("A", vec![0.2, 0.98]),
            ("B", vec![1.0, 0.0]),
            ("C", vec![0.9, 0.1]),
        ])
    }

    #[test]
    fn score_matches_is_inclusive_and_ordered() {
        let corpus = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0]];
        let scored = score_matches(&[1.0, 0.0], &corpus, 1.0).unwrap();

        let indices: Vec<usize> = scored.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn score_matches_partitions_by_threshold() {
        let corpus: Vec<Vec<f32>> = (0..20)
            .map(|i| {
                let angle = i as f32 * 0.15;
                vec![angle.cos(), angle.sin()]
            })
            .collect();
        let threshold = 0.7;
        let matched = score_matches(&[1.0, 0.0], &corpus, threshold).unwrap();

        for (i, v) in corpus.iter().enumerate() {
            let score = cosine_similarity(&[1.0, 0.0], v);
            let included = matched.iter().any(|(m, _)| *m == i);
            assert_eq!(included, score >= threshold, "index {i} score {score}");
        }
    }

    #[test]
    fn score_matches_rejects_mixed_dimensions() {
        let corpus = vec![vec![1.0, 0.0, 0.0]];
        assert!(matches!(
            score_matches(&[1.0, 0.0], &corpus, 0.5),
            Err(QsimError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn empty_corpus_makes_no_calls() {
        let embedder = embedder();
        let judge = FixedVerdict(QualityVerdict::rejected("never asked"));

        let outcome = find_matches(
            "query",
            &[],
            &embedder,
            Some(&judge),
            0.85,
            &BatchOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, MatchOutcome::EmptyCorpus);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn returns_matches_in_corpus_order() {
        let embedder = embedder();
        let outcome = find_matches(
            "query",
            &corpus(),
            &embedder,
            None,
            0.85,
            &BatchOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            MatchOutcome::Matches(vec![Record::new("B", "b"), Record::new("C", "c")])
        );
        assert_eq!(embedder.calls(), 4);
    }

    #[tokio::test]
    async fn poor_quality_stops_before_embedding() {
        let embedder = embedder();
        let judge = FixedVerdict(QualityVerdict::rejected("not a question"));

        let err = find_matches(
            "query",
            &corpus(),
            &embedder,
            Some(&judge),
            0.85,
            &BatchOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, QsimError::PoorQualityInput { ref reason } if reason == "not a question"));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn provider_failure_returns_no_partial_result() {
        let mut embedder = embedder();
        embedder.fail_on = Some("C".to_string());

        let err = find_matches(
            "query",
            &corpus(),
            &embedder,
            None,
            0.85,
            &BatchOptions::default(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "provider_unavailable");
    }

    #[tokio::test]
    async fn markup_only_question_is_never_sent_or_matched() {
        let embedder = embedder();
        let corpus = vec![Record::new("<p> </p>", "empty"), Record::new("B", "b")];

        let outcome = find_matches(
            "query",
            &corpus,
            &embedder,
            None,
            0.85,
            &BatchOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, MatchOutcome::Matches(vec![Record::new("B", "b")]));
        assert_eq!(embedder.calls(), 2);
    }

    #[tokio::test]
    async fn corpus_markup_is_cleaned_before_embedding() {
        let corpus = vec![
            Record::new("<p>What is the <b>capital</b> of France?</p>", "Paris"),
            Record::new("How tall is Mount Everest?", "8849m"),
        ];
        let embedder = LocalHashEmbedding::new(256);

        let outcome = find_matches(
            "What is the capital of France?",
            &corpus,
            &embedder,
            None,
            0.99,
            &BatchOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, MatchOutcome::Matches(vec![corpus[0].clone()]));
    }
}
