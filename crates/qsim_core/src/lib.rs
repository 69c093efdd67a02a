pub mod cluster;
pub mod embed;
pub mod error;
pub mod model;
pub mod providers;
pub mod resolver;
pub mod retrieval;
pub mod service;
pub mod settings;
pub mod text;
pub mod vector;

pub use cluster::{cluster_indices, group, partition, GroupOutcome, Linkage};
pub use embed::{embed_all, BatchOptions, EmbeddingProvider, QualityJudge, QualityVerdict};
pub use error::{ErrorBody, FieldErrors, QsimError, Result};
pub use model::{CheckRequest, CheckResponse, Cluster, GroupRequest, GroupResponse, Record, Verdict};
pub use providers::{Capability, ProviderId, ProviderRegistry, ProviderSource};
pub use resolver::{HttpQuestionResolver, QuestionSetResolver, StaticQuestionSet};
pub use retrieval::{find_matches, score_matches, MatchOutcome};
pub use service::{
    check_similarity, group_similar_questions, validate_check_request, validate_group_request,
    ServiceContext,
};
pub use settings::{Settings, DEFAULT_THRESHOLD};
pub use text::clean_html;
pub use vector::{cosine_similarity, SimilarityMatrix};
