use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::providers::ProviderId;

/// Per-field validation messages, keyed by request field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum QsimError {
    #[error("invalid request: {0}")]
    Validation(FieldErrors),

    #[error("invalid question provided: {reason}")]
    PoorQualityInput { reason: String },

    #[error("resource not found at {location}: {reason}")]
    ResourceNotFound { location: String, reason: String },

    #[error("server configuration error for {provider}: {reason}")]
    ProviderConfig { provider: ProviderId, reason: String },

    #[error("{provider} provider unavailable: {reason}")]
    ProviderUnavailable { provider: ProviderId, reason: String },

    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

pub type Result<T> = std::result::Result<T, QsimError>;

impl QsimError {
    pub fn resource_not_found(location: &str, reason: impl fmt::Display) -> Self {
        Self::ResourceNotFound {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn provider_config(provider: ProviderId, reason: impl Into<String>) -> Self {
        Self::ProviderConfig {
            provider,
            reason: reason.into(),
        }
    }

    pub fn provider_unavailable(provider: ProviderId, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider,
            reason: reason.into(),
        }
    }

    /// Stable machine-readable tag for the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::PoorQualityInput { .. } => "poor_quality_input",
            Self::ResourceNotFound { .. } => "resource_not_found",
            Self::ProviderConfig { .. } => "provider_config_error",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
        }
    }

    /// HTTP-style status an outer transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::PoorQualityInput { .. } => 400,
            Self::ResourceNotFound { .. } => 404,
            Self::ProviderConfig { .. } | Self::DimensionMismatch { .. } => 500,
            Self::ProviderUnavailable { .. } => 503,
        }
    }

    /// Only transient provider faults are worth retrying; nothing here retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }
}

/// Serializable failure body, one per error kind.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
}

impl From<&QsimError> for ErrorBody {
    fn from(err: &QsimError) -> Self {
        let (error, reason, fields) = match err {
            QsimError::Validation(fields) => (
                "Request validation failed.".to_string(),
                None,
                Some(fields.clone()),
            ),
            QsimError::PoorQualityInput { reason } => (
                "Invalid question provided".to_string(),
                Some(reason.clone()),
                None,
            ),
            QsimError::ResourceNotFound { reason, .. } => (
                "Resource not found at URL or could not be parsed.".to_string(),
                Some(reason.clone()),
                None,
            ),
            QsimError::ProviderConfig { provider, reason } => (
                format!(
                    "Server configuration error: model name not found for provider '{provider}'."
                ),
                Some(reason.clone()),
                None,
            ),
            QsimError::ProviderUnavailable { .. } => (
                "AI service provider is currently unavailable. Please try again later."
                    .to_string(),
                None,
                None,
            ),
            QsimError::DimensionMismatch { .. } => (
                "Embedding provider returned vectors of inconsistent dimension.".to_string(),
                Some(err.to_string()),
                None,
            ),
        };

        Self {
            error,
            kind: err.kind(),
            reason,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_field_errors_are_empty() {
        let errors = FieldErrors::new();
        assert!(errors.is_empty());
        assert_eq!(errors.to_string(), "");
    }

    #[test]
    fn field_errors_collect_per_field() {
        let mut errors = FieldErrors::new();
        errors.push("question", "Missing data for required field.");
        errors.push("questions_url", "Not a valid URL.");
        errors.push("question", "Must not be blank.");

        assert_eq!(errors.get("question").map(<[String]>::len), Some(2));
        assert_eq!(
            errors.to_string(),
            "question: Missing data for required field.; question: Must not be blank.; questions_url: Not a valid URL."
        );

        let err = QsimError::Validation(errors);
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn kinds_and_statuses_stay_distinct() {
        let config = QsimError::provider_config(ProviderId::Gemini, "no embedding model");
        let unavailable = QsimError::provider_unavailable(ProviderId::Gemini, "timed out");

        assert_ne!(config.kind(), unavailable.kind());
        assert_eq!(config.status_code(), 500);
        assert_eq!(unavailable.status_code(), 503);
        assert!(!config.is_retryable());
        assert!(unavailable.is_retryable());
        assert_eq!(
            QsimError::resource_not_found("https://x", "404").status_code(),
            404
        );
    }

    #[test]
    fn error_body_serializes_fields_only_for_validation() {
        let mut fields = FieldErrors::new();
        fields.push("questions_url", "Missing data for required field.");
        let body = ErrorBody::from(&QsimError::Validation(fields));
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["kind"], "validation_error");
        assert_eq!(
            json["fields"]["questions_url"][0],
            "Missing data for required field."
        );
        assert!(json.get("reason").is_none());

        let body = ErrorBody::from(&QsimError::PoorQualityInput {
            reason: "incomplete sentence".into(),
        });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"], "Invalid question provided");
        assert_eq!(json["reason"], "incomplete sentence");
        assert!(json.get("fields").is_none());
    }
}
