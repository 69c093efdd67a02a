use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{debug, error};

use crate::error::{QsimError, Result};
use crate::model::Record;
use crate::settings::DEFAULT_FETCH_TIMEOUT_MS;

/// Fetches the reference question set for one request. Nothing is cached;
/// the resource may change between calls.
#[async_trait]
pub trait QuestionSetResolver: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<Vec<Record>>;
}

/// Reads a JSON array of `{"Question", "Answer"}` objects from `http(s)://`
/// or `file://` locations.
#[derive(Debug, Clone)]
pub struct HttpQuestionResolver {
    client: Client,
    timeout: Duration,
}

impl Default for HttpQuestionResolver {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS))
    }
}

impl HttpQuestionResolver {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(Client::new(), timeout)
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn read_http(&self, location: &str, url: Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                error!(location, error = %e, "fetching question set failed");
                QsimError::resource_not_found(location, e)
            })?;

        let body = response
            .bytes()
            .await
            .map_err(|e| QsimError::resource_not_found(location, e))?;
        Ok(body.to_vec())
    }

    async fn read_file(&self, location: &str, url: &Url) -> Result<Vec<u8>> {
        let path = url
            .to_file_path()
            .map_err(|_| QsimError::resource_not_found(location, "not a local file path"))?;
        tokio::fs::read(&path).await.map_err(|e| {
            error!(location, error = %e, "reading question set failed");
            QsimError::resource_not_found(location, e)
        })
    }
}

#[async_trait]
impl QuestionSetResolver for HttpQuestionResolver {
    async fn fetch(&self, location: &str) -> Result<Vec<Record>> {
        let url = Url::parse(location).map_err(|e| QsimError::resource_not_found(location, e))?;

        let body = match url.scheme() {
            "http" | "https" => self.read_http(location, url).await?,
            "file" => self.read_file(location, &url).await?,
            other => {
                return Err(QsimError::resource_not_found(
                    location,
                    format!("unsupported scheme '{other}'"),
                ))
            }
        };

        let records = parse_records(location, &body)?;
        debug!(location, count = records.len(), "fetched question set");
        Ok(records)
    }
}

/// Parses a JSON array of question records. Anything else, including a
/// top-level object, counts as unparseable.
pub fn parse_records(location: &str, body: &[u8]) -> Result<Vec<Record>> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| QsimError::resource_not_found(location, format!("invalid JSON: {e}")))?;

    let serde_json::Value::Array(items) = value else {
        return Err(QsimError::resource_not_found(
            location,
            "expected a JSON array of questions",
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(QsimError::resource_not_found(
                    location,
                    format!("entry {i} is not an object"),
                ));
            }
            serde_json::from_value::<Record>(item).map_err(|e| {
                QsimError::resource_not_found(location, format!("entry {i}: {e}"))
            })
        })
        .collect()
}

/// Serves a fixed record list regardless of location.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestionSet {
    pub records: Vec<Record>,
}

impl StaticQuestionSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl QuestionSetResolver for StaticQuestionSet {
    async fn fetch(&self, _location: &str) -> Result<Vec<Record>> {
        Ok(self.records.clone())
    }
}
