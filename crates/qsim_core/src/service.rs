//! Request-level entry points: validate, resolve providers, fetch, compute.
//!
//! Every call builds its own corpus and vectors and drops them on return.

use std::sync::Arc;

use reqwest::Url;
use tracing::info;

use crate::cluster::{group, GroupOutcome};
use crate::embed::judge_within;
use crate::error::{FieldErrors, QsimError, Result};
use crate::model::{CheckRequest, CheckResponse, GroupRequest, GroupResponse};
use crate::providers::{ProviderId, ProviderRegistry, ProviderSource};
use crate::resolver::{HttpQuestionResolver, QuestionSetResolver};
use crate::retrieval::{find_matches, MatchOutcome};
use crate::settings::Settings;

const MISSING: &str = "Missing data for required field.";

pub struct ServiceContext {
    pub settings: Settings,
    pub providers: Arc<dyn ProviderSource>,
    pub resolver: Arc<dyn QuestionSetResolver>,
}

impl ServiceContext {
    /// Remote providers from `settings` and the HTTP/file resolver.
    pub fn new(settings: Settings) -> Self {
        let resolver = HttpQuestionResolver::new(settings.fetch_timeout());
        Self {
            providers: Arc::new(ProviderRegistry::new(settings.clone())),
            resolver: Arc::new(resolver),
            settings,
        }
    }

    pub fn with_parts(
        settings: Settings,
        providers: Arc<dyn ProviderSource>,
        resolver: Arc<dyn QuestionSetResolver>,
    ) -> Self {
        Self {
            settings,
            providers,
            resolver,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCheck {
    pub questions_url: String,
    pub question: String,
    pub embedding_provider: ProviderId,
    pub reasoning_provider: ProviderId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidGroup {
    pub questions_url: String,
    pub embedding_provider: ProviderId,
}

fn required_url(errors: &mut FieldErrors, value: Option<&str>) -> Option<String> {
    let Some(raw) = value.map(str::trim) else {
        errors.push("questions_url", MISSING);
        return None;
    };

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "file") => Some(raw.to_string()),
        _ => {
            errors.push("questions_url", "Not a valid URL.");
            None
        }
    }
}

fn provider_or_default(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    default: ProviderId,
) -> ProviderId {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => default,
        Some(name) => name.parse().unwrap_or_else(|msg: String| {
            errors.push(field, msg);
            default
        }),
    }
}

pub fn validate_check_request(request: &CheckRequest, settings: &Settings) -> Result<ValidCheck> {
    let mut errors = FieldErrors::new();

    let questions_url = required_url(&mut errors, request.questions_url.as_deref());
    let question = match request.question.as_deref() {
        None => {
            errors.push("question", MISSING);
            None
        }
        Some(q) if q.trim().is_empty() => {
            errors.push("question", "Must not be blank.");
            None
        }
        Some(q) => Some(q.to_string()),
    };
    let embedding_provider = provider_or_default(
        &mut errors,
        "embedding_provider",
        request.embedding_provider.as_deref(),
        settings.default_embedding_provider,
    );
    let reasoning_provider = provider_or_default(
        &mut errors,
        "reasoning_provider",
        request.reasoning_provider.as_deref(),
        settings.default_reasoning_provider,
    );

    match (questions_url, question) {
        (Some(questions_url), Some(question)) if errors.is_empty() => Ok(ValidCheck {
            questions_url,
            question,
            embedding_provider,
            reasoning_provider,
        }),
        _ => Err(QsimError::Validation(errors)),
    }
}

pub fn validate_group_request(request: &GroupRequest, settings: &Settings) -> Result<ValidGroup> {
    let mut errors = FieldErrors::new();

    let questions_url = required_url(&mut errors, request.questions_url.as_deref());
    let embedding_provider = provider_or_default(
        &mut errors,
        "embedding_provider",
        request.embedding_provider.as_deref(),
        settings.default_embedding_provider,
    );

    match questions_url {
        Some(questions_url) if errors.is_empty() => Ok(ValidGroup {
            questions_url,
            embedding_provider,
        }),
        _ => Err(QsimError::Validation(errors)),
    }
}

/// Decides whether `request.question` duplicates anything in the referenced
/// question set.
///
/// Both providers are resolved before any remote work so a configuration
/// defect is reported without spending a call. The question is judged before
/// the set is fetched.
pub async fn check_similarity(request: &CheckRequest, ctx: &ServiceContext) -> Result<CheckResponse> {
    let valid = validate_check_request(request, &ctx.settings)?;
    let embedder = ctx.providers.embedding(valid.embedding_provider)?;
    let judge = ctx.providers.judge(valid.reasoning_provider)?;

    let verdict = judge_within(judge.as_ref(), &valid.question, ctx.settings.provider_timeout()).await?;
    if !verdict.is_valid {
        info!(provider = %valid.reasoning_provider, reason = %verdict.reason, "question rejected");
        return Err(QsimError::PoorQualityInput {
            reason: verdict.reason,
        });
    }

    let corpus = ctx.resolver.fetch(&valid.questions_url).await?;
    let outcome = find_matches(
        &valid.question,
        &corpus,
        embedder.as_ref(),
        None,
        ctx.settings.similarity_threshold,
        &ctx.settings.batch_options(),
    )
    .await?;

    let response = match outcome {
        MatchOutcome::EmptyCorpus => CheckResponse::empty_corpus(),
        MatchOutcome::Matches(matches) => CheckResponse::from_matches(matches),
    };
    info!(
        provider = %valid.embedding_provider,
        corpus = corpus.len(),
        matched = response.matched_questions.as_ref().map_or(0, Vec::len),
        "similarity check complete"
    );
    Ok(response)
}

/// Partitions the referenced question set into groups of similar questions.
pub async fn group_similar_questions(
    request: &GroupRequest,
    ctx: &ServiceContext,
) -> Result<GroupResponse> {
    let valid = validate_group_request(request, &ctx.settings)?;
    let embedder = ctx.providers.embedding(valid.embedding_provider)?;

    let corpus = ctx.resolver.fetch(&valid.questions_url).await?;
    let outcome = group(
        &corpus,
        embedder.as_ref(),
        ctx.settings.similarity_threshold,
        ctx.settings.linkage,
        &ctx.settings.batch_options(),
    )
    .await?;

    let response = match outcome {
        GroupOutcome::NotEnoughItems => GroupResponse::not_enough_items(),
        GroupOutcome::Groups(groups) => GroupResponse::from_groups(groups),
    };
    info!(
        provider = %valid.embedding_provider,
        corpus = corpus.len(),
        groups = response.matched_groups.as_ref().map_or(0, Vec::len),
        "grouping complete"
    );
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::embed::testing::FixedEmbeddings;
    use crate::embed::{EmbeddingProvider, QualityJudge};
    use crate::model::{Record, Verdict};
    use crate::providers::{HeuristicJudge, LocalHashEmbedding};
    use crate::resolver::StaticQuestionSet;

    const URL: &str = "https://example.com/questions.json";

    struct Fakes {
        embedder: Arc<FixedEmbeddings>,
    }

    impl ProviderSource for Fakes {
        fn embedding(&self, id: ProviderId) -> Result<Arc<dyn EmbeddingProvider>> {
            match id {
                ProviderId::Local => Ok(self.embedder.clone()),
                other => Err(QsimError::provider_config(other, "no model")),
            }
        }

        fn judge(&self, id: ProviderId) -> Result<Arc<dyn QualityJudge>> {
            match id {
                ProviderId::Local => Ok(Arc::new(HeuristicJudge::default())),
                other => Err(QsimError::provider_config(other, "no model")),
            }
        }
    }

    /// Counts fetches so tests can assert ordering of side effects.
    struct CountingResolver {
        inner: StaticQuestionSet,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl QuestionSetResolver for CountingResolver {
        async fn fetch(&self, location: &str) -> Result<Vec<Record>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(location).await
        }
    }

    fn abc() -> Vec<Record> {
        vec![
            Record::new("A", "a"),
            Record::new("B", "b"),
            Record::new("C", "c"),
        ]
    }

    fn fixed_embedder() -> Arc<FixedEmbeddings> {
        Arc::new(FixedEmbeddings::new([
            ("Is this a duplicate question?", vec![1.0, 0.0]),
            ("A", vec![1.0, 0.0]),
            ("B", vec![0.95, 0.3122499]),
            ("C", vec![0.2, 0.9797959]),
        ]))
    }

    fn context(records: Vec<Record>) -> (ServiceContext, Arc<FixedEmbeddings>, Arc<CountingResolver>) {
        let embedder = fixed_embedder();
        let resolver = Arc::new(CountingResolver {
            inner: StaticQuestionSet::new(records),
            fetches: AtomicUsize::new(0),
        });
        let ctx = ServiceContext::with_parts(
            Settings::local(),
            Arc::new(Fakes {
                embedder: embedder.clone(),
            }),
            resolver.clone(),
        );
        (ctx, embedder, resolver)
    }

    fn check(question: &str) -> CheckRequest {
        CheckRequest {
            questions_url: Some(URL.into()),
            question: Some(question.into()),
            ..CheckRequest::default()
        }
    }

    #[test]
    fn validation_reports_every_field() {
        let request = CheckRequest {
            questions_url: Some("not a url".into()),
            question: Some("   ".into()),
            embedding_provider: Some("cohere".into()),
            reasoning_provider: None,
        };
        let Err(QsimError::Validation(fields)) =
            validate_check_request(&request, &Settings::default())
        else {
            panic!("expected validation error");
        };

        let names: Vec<&str> = fields.fields().collect();
        assert_eq!(names, vec!["embedding_provider", "question", "questions_url"]);
    }

    #[test]
    fn missing_fields_use_required_message() {
        let Err(QsimError::Validation(fields)) =
            validate_group_request(&GroupRequest::default(), &Settings::default())
        else {
            panic!("expected validation error");
        };
        assert_eq!(fields.get("questions_url"), Some(&[MISSING.to_string()][..]));
    }

    #[test]
    fn question_text_is_kept_verbatim() {
        let valid =
            validate_check_request(&check("  How do I log in?\n"), &Settings::default()).unwrap();
        assert_eq!(valid.question, "  How do I log in?\n");
    }

    #[test]
    fn omitted_providers_fall_back_to_defaults() {
        let valid = validate_check_request(&check("q"), &Settings::default()).unwrap();
        assert_eq!(valid.embedding_provider, ProviderId::Gemini);
        assert_eq!(valid.reasoning_provider, ProviderId::Gemini);

        let request = GroupRequest {
            questions_url: Some("file:///tmp/q.json".into()),
            embedding_provider: Some("OpenAI".into()),
        };
        let valid = validate_group_request(&request, &Settings::default()).unwrap();
        assert_eq!(valid.embedding_provider, ProviderId::OpenAi);
    }

    #[tokio::test]
    async fn duplicate_question_matches() {
        let (ctx, _, _) = context(abc());
        let response = check_similarity(&check("Is this a duplicate question?"), &ctx)
            .await
            .unwrap();

        assert_eq!(response.response, Verdict::Yes);
        assert_eq!(
            response.matched_questions,
            Some(vec![Record::new("A", "a"), Record::new("B", "b")])
        );
    }

    #[tokio::test]
    async fn empty_set_reports_reason_without_embedding() {
        let (ctx, embedder, _) = context(Vec::new());
        let response = check_similarity(&check("Is this a duplicate question?"), &ctx)
            .await
            .unwrap();

        assert_eq!(response, CheckResponse::empty_corpus());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn poor_question_is_rejected_before_fetch() {
        let (ctx, embedder, resolver) = context(abc());
        let err = check_similarity(&check("duplicate?"), &ctx).await.unwrap_err();

        assert_eq!(err.kind(), "poor_quality_input");
        assert_eq!(resolver.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_provider_is_distinct_from_unavailable() {
        let (ctx, _, resolver) = context(abc());
        let mut request = check("Is this a duplicate question?");
        request.embedding_provider = Some("openai".into());

        let err = check_similarity(&request, &ctx).await.unwrap_err();
        assert!(matches!(err, QsimError::ProviderConfig { provider: ProviderId::OpenAi, .. }));
        assert_eq!(resolver.fetches.load(Ordering::SeqCst), 0);

        let mut failing = FixedEmbeddings::new([("A", vec![1.0]), ("B", vec![1.0])]);
        failing.fail_on = Some("B".into());
        let ctx = ServiceContext::with_parts(
            Settings::local(),
            Arc::new(Fakes {
                embedder: Arc::new(failing),
            }),
            Arc::new(StaticQuestionSet::new(abc())),
        );
        let err = group_similar_questions(
            &GroupRequest {
                questions_url: Some(URL.into()),
                embedding_provider: None,
            },
            &ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QsimError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn groups_similar_questions() {
        let (ctx, _, _) = context(abc());
        let response = group_similar_questions(
            &GroupRequest {
                questions_url: Some(URL.into()),
                embedding_provider: Some("local".into()),
            },
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(
            response,
            GroupResponse::from_groups(vec![vec![Record::new("A", "a"), Record::new("B", "b")]])
        );
    }

    #[tokio::test]
    async fn single_record_is_not_enough_to_group() {
        let (ctx, _, _) = context(vec![Record::new("A", "a")]);
        let response = group_similar_questions(
            &GroupRequest {
                questions_url: Some(URL.into()),
                embedding_provider: None,
            },
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(response, GroupResponse::not_enough_items());
    }

    #[tokio::test]
    async fn no_surviving_cluster_is_a_plain_no() {
        let records = vec![
            Record::new("What is the capital of France?", "Paris"),
            Record::new("How tall is Mount Everest?", "8849m"),
        ];
        let ctx = ServiceContext::with_parts(
            Settings::local(),
            Arc::new(LocalOnly),
            Arc::new(StaticQuestionSet::new(records)),
        );
        let response = group_similar_questions(
            &GroupRequest {
                questions_url: Some(URL.into()),
                embedding_provider: None,
            },
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(response, GroupResponse::no_groups());
    }

    struct LocalOnly;

    impl ProviderSource for LocalOnly {
        fn embedding(&self, _id: ProviderId) -> Result<Arc<dyn EmbeddingProvider>> {
            Ok(Arc::new(LocalHashEmbedding::default()))
        }

        fn judge(&self, _id: ProviderId) -> Result<Arc<dyn QualityJudge>> {
            Ok(Arc::new(HeuristicJudge::default()))
        }
    }
}
