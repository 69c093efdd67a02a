use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cluster::Linkage;
use crate::embed::BatchOptions;
use crate::error::FieldErrors;
use crate::providers::{Capability, ProviderId};

pub const DEFAULT_THRESHOLD: f32 = 0.85;
pub const DEFAULT_EMBEDDING_DIM: usize = 768;
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAX_CONCURRENT_EMBEDDINGS: usize = 8;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub embedding_model: Option<String>,
    pub reasoning_model: Option<String>,
}

/// Values supplied by the surrounding application. Nothing here is read from
/// the environment; callers fill it in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub similarity_threshold: f32,
    pub linkage: Linkage,
    pub default_embedding_provider: ProviderId,
    pub default_reasoning_provider: ProviderId,
    pub gemini: ProviderSettings,
    pub openai: ProviderSettings,
    pub deepseek: ProviderSettings,
    pub local_embedding_dim: usize,
    pub provider_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub max_concurrent_embeddings: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_THRESHOLD,
            linkage: Linkage::default(),
            default_embedding_provider: ProviderId::Gemini,
            default_reasoning_provider: ProviderId::Gemini,
            gemini: ProviderSettings::default(),
            openai: ProviderSettings::default(),
            deepseek: ProviderSettings::default(),
            local_embedding_dim: DEFAULT_EMBEDDING_DIM,
            provider_timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            max_concurrent_embeddings: DEFAULT_MAX_CONCURRENT_EMBEDDINGS,
        }
    }
}

impl Settings {
    /// Settings for a fully offline run on the `local` provider.
    pub fn local() -> Self {
        Self {
            default_embedding_provider: ProviderId::Local,
            default_reasoning_provider: ProviderId::Local,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            errors.push(
                "similarity_threshold",
                format!(
                    "must be in (0, 1], got {}",
                    self.similarity_threshold
                ),
            );
        }
        if self.max_concurrent_embeddings == 0 {
            errors.push("max_concurrent_embeddings", "must be at least 1");
        }
        if self.provider_timeout_ms == 0 {
            errors.push("provider_timeout_ms", "must be greater than zero");
        }
        if self.fetch_timeout_ms == 0 {
            errors.push("fetch_timeout_ms", "must be greater than zero");
        }
        if self.local_embedding_dim == 0 {
            errors.push("local_embedding_dim", "must be greater than zero");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn provider(&self, id: ProviderId) -> Option<&ProviderSettings> {
        match id {
            ProviderId::Gemini => Some(&self.gemini),
            ProviderId::OpenAi => Some(&self.openai),
            ProviderId::DeepSeek => Some(&self.deepseek),
            ProviderId::Local => None,
        }
    }

    /// Configured model for `id`, blank values counting as unset.
    pub fn model(&self, id: ProviderId, capability: Capability) -> Option<&str> {
        let provider = self.provider(id)?;
        let model = match capability {
            Capability::Embedding => provider.embedding_model.as_deref(),
            Capability::Reasoning => provider.reasoning_model.as_deref(),
        };
        model.map(str::trim).filter(|m| !m.is_empty())
    }

    pub fn api_key(&self, id: ProviderId) -> Option<&str> {
        self.provider(id)?
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn base_url(&self, id: ProviderId) -> &str {
        let configured = self
            .provider(id)
            .and_then(|p| p.base_url.as_deref())
            .filter(|u| !u.trim().is_empty());
        match (configured, id) {
            (Some(url), _) => url,
            (None, ProviderId::Gemini) => GEMINI_BASE_URL,
            (None, ProviderId::DeepSeek) => DEEPSEEK_BASE_URL,
            (None, ProviderId::OpenAi | ProviderId::Local) => OPENAI_BASE_URL,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            timeout: self.provider_timeout(),
            max_in_flight: self.max_concurrent_embeddings,
        }
    }
}
