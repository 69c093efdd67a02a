//! Google Gemini REST API (`embedContent` / `generateContent`).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::embed::{EmbeddingProvider, QualityJudge, QualityVerdict};
use crate::error::{QsimError, Result};
use crate::providers::{
    check_status, parse_verdict, transport_error, ProviderId, RemoteParts, QUALITY_PROMPT,
};

#[derive(Debug, Clone)]
pub struct Gemini {
    parts: RemoteParts,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

impl Gemini {
    pub fn new(parts: RemoteParts) -> Self {
        Self { parts }
    }

    fn model_path(&self) -> String {
        let model = self.parts.model.trim_start_matches("models/");
        format!("models/{model}")
    }

    async fn post<B, R>(&self, action: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self
            .parts
            .endpoint(&format!("v1beta/{}:{action}", self.model_path()));
        let response = self
            .parts
            .client
            .post(url)
            .header("x-goog-api-key", &self.parts.api_key)
            .timeout(self.parts.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(ProviderId::Gemini, e))?;

        check_status(ProviderId::Gemini, response)
            .await?
            .json::<R>()
            .await
            .map_err(|e| {
                QsimError::provider_unavailable(ProviderId::Gemini, format!("malformed response: {e}"))
            })
    }
}

#[async_trait]
impl EmbeddingProvider for Gemini {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: self.model_path(),
            content: Content {
                role: None,
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            task_type: "RETRIEVAL_DOCUMENT",
        };
        let response: EmbedResponse = self.post("embedContent", &request).await?;
        Ok(response.embedding.values)
    }
}

#[async_trait]
impl QualityJudge for Gemini {
    fn provider(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn judge(&self, text: &str) -> Result<QualityVerdict> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: format!("{QUALITY_PROMPT}\n\nQuestion: \"{text}\""),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };
        let response: GenerateResponse = self.post("generateContent", &request).await?;
        let content: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        Ok(parse_verdict(ProviderId::Gemini, &content))
    }
}
