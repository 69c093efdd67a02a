//! OpenAI-style REST API, also spoken by DeepSeek.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::embed::{EmbeddingProvider, QualityJudge, QualityVerdict};
use crate::error::{QsimError, Result};
use crate::providers::{
    check_status, parse_verdict, transport_error, ProviderId, RemoteParts, QUALITY_PROMPT,
};

#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    provider: ProviderId,
    parts: RemoteParts,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl OpenAiCompatible {
    pub fn new(provider: ProviderId, parts: RemoteParts) -> Self {
        Self { provider, parts }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .parts
            .client
            .post(self.parts.endpoint(path))
            .bearer_auth(&self.parts.api_key)
            .timeout(self.parts.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(self.provider, e))?;

        check_status(self.provider, response)
            .await?
            .json::<R>()
            .await
            .map_err(|e| {
                QsimError::provider_unavailable(self.provider, format!("malformed response: {e}"))
            })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatible {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.parts.model,
            input: text,
        };
        let response: EmbeddingResponse = self.post("embeddings", &request).await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                QsimError::provider_unavailable(self.provider, "response carried no embedding")
            })
    }
}

#[async_trait]
impl QualityJudge for OpenAiCompatible {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn judge(&self, text: &str) -> Result<QualityVerdict> {
        let request = ChatRequest {
            model: &self.parts.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: QUALITY_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Question: \"{text}\""),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };
        let response: ChatResponse = self.post("chat/completions", &request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(parse_verdict(self.provider, &content))
    }
}
