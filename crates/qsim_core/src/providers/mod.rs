//! Provider selection and the remote adapters behind it.
//!
//! A request names a provider once; the registry turns that name into a
//! concrete embedder or judge, and that single instance serves every call the
//! request makes.

pub mod gemini;
pub mod local;
pub mod openai;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::embed::{EmbeddingProvider, QualityJudge, QualityVerdict};
use crate::error::{QsimError, Result};
use crate::settings::Settings;

pub use gemini::Gemini;
pub use local::{HeuristicJudge, LocalHashEmbedding};
pub use openai::OpenAiCompatible;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Gemini,
    OpenAi,
    DeepSeek,
    Local,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Gemini,
        ProviderId::OpenAi,
        ProviderId::DeepSeek,
        ProviderId::Local,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::OpenAi => "openai",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Local => "local",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unsupported provider '{}' (expected one of gemini, openai, deepseek, local)",
                    s.trim()
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Embedding,
    Reasoning,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Embedding => f.write_str("embedding"),
            Capability::Reasoning => f.write_str("reasoning"),
        }
    }
}

/// Resolves a provider id into the capability a request needs.
pub trait ProviderSource: Send + Sync {
    fn embedding(&self, id: ProviderId) -> Result<Arc<dyn EmbeddingProvider>>;

    fn judge(&self, id: ProviderId) -> Result<Arc<dyn QualityJudge>>;
}

/// Builds adapters from [`Settings`]. Holds no per-request state; the shared
/// `reqwest::Client` is only a connection pool.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    settings: Settings,
    client: Client,
}

impl ProviderRegistry {
    pub fn new(settings: Settings) -> Self {
        Self::with_client(settings, Client::new())
    }

    pub fn with_client(settings: Settings, client: Client) -> Self {
        Self { settings, client }
    }

    fn remote_parts(&self, id: ProviderId, capability: Capability) -> Result<RemoteParts> {
        let model = self.settings.model(id, capability).ok_or_else(|| {
            QsimError::provider_config(id, format!("no {capability} model configured for {id}"))
        })?;
        let api_key = self
            .settings
            .api_key(id)
            .ok_or_else(|| QsimError::provider_config(id, format!("no API key configured for {id}")))?;

        Ok(RemoteParts {
            client: self.client.clone(),
            base_url: self.settings.base_url(id).to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout: self.settings.provider_timeout(),
        })
    }
}

impl ProviderSource for ProviderRegistry {
    fn embedding(&self, id: ProviderId) -> Result<Arc<dyn EmbeddingProvider>> {
        match id {
            ProviderId::Local => Ok(Arc::new(LocalHashEmbedding::new(
                self.settings.local_embedding_dim,
            ))),
            ProviderId::DeepSeek => Err(QsimError::provider_config(
                id,
                "deepseek offers no embedding model",
            )),
            ProviderId::Gemini => Ok(Arc::new(Gemini::new(
                self.remote_parts(id, Capability::Embedding)?,
            ))),
            ProviderId::OpenAi => Ok(Arc::new(OpenAiCompatible::new(
                id,
                self.remote_parts(id, Capability::Embedding)?,
            ))),
        }
    }

    fn judge(&self, id: ProviderId) -> Result<Arc<dyn QualityJudge>> {
        match id {
            ProviderId::Local => Ok(Arc::new(HeuristicJudge::default())),
            ProviderId::Gemini => Ok(Arc::new(Gemini::new(
                self.remote_parts(id, Capability::Reasoning)?,
            ))),
            ProviderId::OpenAi | ProviderId::DeepSeek => Ok(Arc::new(OpenAiCompatible::new(
                id,
                self.remote_parts(id, Capability::Reasoning)?,
            ))),
        }
    }
}

/// Connection details shared by the remote adapters.
#[derive(Debug, Clone)]
pub struct RemoteParts {
    pub client: Client,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: std::time::Duration,
}

impl RemoteParts {
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

pub(crate) const QUALITY_PROMPT: &str = "You review questions submitted to a question bank. \
Decide whether the question is grammatically correct, complete and logically coherent. \
Reply with a JSON object only, with the keys 'is_valid' (boolean) and 'reason' (a short explanation).";

pub(crate) const VERDICT_FALLBACK_REASON: &str =
    "Validator service failed; proceeding with caution.";

/// Parses the judge's JSON reply. A reply that is not JSON at all does not
/// block the request; a JSON reply without a true `is_valid` rejects it.
pub(crate) fn parse_verdict(provider: ProviderId, content: &str) -> QualityVerdict {
    let value = match serde_json::from_str::<serde_json::Value>(content.trim()) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(%provider, error = %err, "unreadable quality verdict, accepting question");
            return QualityVerdict::valid(VERDICT_FALLBACK_REASON);
        }
    };

    QualityVerdict {
        is_valid: value
            .get("is_valid")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
        reason: value
            .get("reason")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

pub(crate) fn transport_error(provider: ProviderId, err: reqwest::Error) -> QsimError {
    error!(%provider, error = %err, "provider request failed");
    if err.is_timeout() {
        QsimError::provider_unavailable(provider, "request timed out")
    } else {
        QsimError::provider_unavailable(provider, err.to_string())
    }
}

/// Rejected credentials and unknown models are configuration defects; every
/// other failure status is treated as transient.
pub(crate) async fn check_status(provider: ProviderId, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    error!(%provider, %status, body = %body, "provider returned an error status");

    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::NOT_FOUND => Err(QsimError::provider_config(
            provider,
            format!("provider rejected the request with {status}"),
        )),
        _ => Err(QsimError::provider_unavailable(
            provider,
            format!("provider answered {status}"),
        )),
    }
}
