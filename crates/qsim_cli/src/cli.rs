use clap::{Args, Parser, Subcommand, ValueEnum};
use qsim_core::settings::{ProviderSettings, DEFAULT_EMBEDDING_DIM, DEFAULT_THRESHOLD};
use qsim_core::{CheckRequest, GroupRequest, Linkage, ProviderId, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "qsim",
    version,
    about = "Find duplicate and similar questions in a question set"
)]
pub struct Cli {
    #[arg(long, global = true, env = "SIMILARITY_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    pub threshold: f32,

    #[arg(long, global = true, env = "QSIM_LINKAGE", default_value = "single")]
    pub linkage: Linkage,

    #[arg(long, global = true, env = "PROVIDER_TIMEOUT", default_value = "30s")]
    pub provider_timeout: humantime::Duration,

    #[arg(long, global = true, env = "FETCH_TIMEOUT", default_value = "15s")]
    pub fetch_timeout: humantime::Duration,

    #[arg(long, global = true, env = "MAX_CONCURRENT_EMBEDDINGS", default_value_t = 8)]
    pub max_concurrent_embeddings: usize,

    #[arg(long, global = true, env = "DEFAULT_EMBEDDING_PROVIDER", default_value = "gemini")]
    pub default_embedding_provider: ProviderId,

    #[arg(long, global = true, env = "DEFAULT_REASONING_PROVIDER", default_value = "gemini")]
    pub default_reasoning_provider: ProviderId,

    #[arg(long, global = true, env = "LOCAL_EMBEDDING_DIM", default_value_t = DEFAULT_EMBEDDING_DIM)]
    pub local_embedding_dim: usize,

    #[command(flatten)]
    pub providers: ProviderArgs,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Credentials, models and endpoints. Normally supplied through the
/// environment.
#[derive(Args, Debug, Default)]
pub struct ProviderArgs {
    #[arg(long, global = true, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(long, global = true, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,

    #[arg(long, global = true, env = "GEMINI_EMBEDDING_MODEL")]
    pub gemini_embedding_model: Option<String>,

    #[arg(long, global = true, env = "GEMINI_REASONING_MODEL")]
    pub gemini_reasoning_model: Option<String>,

    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, global = true, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, global = true, env = "OPENAI_EMBEDDING_MODEL")]
    pub openai_embedding_model: Option<String>,

    #[arg(long, global = true, env = "OPENAI_REASONING_MODEL")]
    pub openai_reasoning_model: Option<String>,

    #[arg(long, global = true, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    pub deepseek_api_key: Option<String>,

    #[arg(long, global = true, env = "DEEPSEEK_BASE_URL")]
    pub deepseek_base_url: Option<String>,

    #[arg(long, global = true, env = "DEEPSEEK_REASONING_MODEL")]
    pub deepseek_reasoning_model: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check whether a question duplicates one already in the set.
    Check {
        #[arg(long)]
        questions_url: String,
        #[arg(long)]
        question: String,
        #[arg(long)]
        embedding_provider: Option<String>,
        #[arg(long)]
        reasoning_provider: Option<String>,
    },
    /// Group the questions of a set by similarity.
    Group {
        #[arg(long)]
        questions_url: String,
        #[arg(long)]
        embedding_provider: Option<String>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

/// A parsed subcommand as the request body the service layer takes.
pub enum Request {
    Check(CheckRequest),
    Group(GroupRequest),
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if self.provider_timeout.as_ref().is_zero() {
            return Err("provider-timeout must be > 0".to_string());
        }
        if self.fetch_timeout.as_ref().is_zero() {
            return Err("fetch-timeout must be > 0".to_string());
        }

        self.to_settings()
            .validate()
            .map_err(|fields| fields.to_string())
    }

    pub fn to_settings(&self) -> Settings {
        let p = &self.providers;
        Settings {
            similarity_threshold: self.threshold,
            linkage: self.linkage,
            default_embedding_provider: self.default_embedding_provider,
            default_reasoning_provider: self.default_reasoning_provider,
            gemini: ProviderSettings {
                api_key: p.gemini_api_key.clone(),
                base_url: p.gemini_base_url.clone(),
                embedding_model: p.gemini_embedding_model.clone(),
                reasoning_model: p.gemini_reasoning_model.clone(),
            },
            openai: ProviderSettings {
                api_key: p.openai_api_key.clone(),
                base_url: p.openai_base_url.clone(),
                embedding_model: p.openai_embedding_model.clone(),
                reasoning_model: p.openai_reasoning_model.clone(),
            },
            deepseek: ProviderSettings {
                api_key: p.deepseek_api_key.clone(),
                base_url: p.deepseek_base_url.clone(),
                embedding_model: None,
                reasoning_model: p.deepseek_reasoning_model.clone(),
            },
            local_embedding_dim: self.local_embedding_dim,
            provider_timeout_ms: millis(&self.provider_timeout),
            fetch_timeout_ms: millis(&self.fetch_timeout),
            max_concurrent_embeddings: self.max_concurrent_embeddings,
        }
    }

    pub fn request(&self) -> Request {
        match &self.command {
            Command::Check {
                questions_url,
                question,
                embedding_provider,
                reasoning_provider,
            } => Request::Check(CheckRequest {
                questions_url: Some(questions_url.clone()),
                question: Some(question.clone()),
                embedding_provider: embedding_provider.clone(),
                reasoning_provider: reasoning_provider.clone(),
            }),
            Command::Group {
                questions_url,
                embedding_provider,
            } => Request::Group(GroupRequest {
                questions_url: Some(questions_url.clone()),
                embedding_provider: embedding_provider.clone(),
            }),
        }
    }
}

fn millis(d: &humantime::Duration) -> u64 {
    u64::try_from(d.as_ref().as_millis()).unwrap_or(u64::MAX)
}
