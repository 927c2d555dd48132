//! Client for the external matching service. Every call carries a request
//! timeout and goes through [`retry_with_backoff`].
pub mod retry;

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::MatchingConfig;
pub use retry::{backoff_delay_ms, retry_with_backoff, RetryPolicy, Transient};

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl Transient for MatchingError {
    fn is_transient(&self) -> bool {
        match self {
            MatchingError::Timeout | MatchingError::Connect(_) => true,
            MatchingError::Status { status, .. } => *status == 429 || (500..600).contains(status),
            MatchingError::Decode(_) | MatchingError::Request(_) => false,
        }
    }
}

impl From<reqwest::Error> for MatchingError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MatchingError::Timeout
        } else if e.is_connect() {
            MatchingError::Connect(e.to_string())
        } else {
            MatchingError::Request(e.to_string())
        }
    }
}

/// One scored vacancy as reported by the matching service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMatch {
    #[serde(alias = "vacante_id")]
    pub vacancy_id: i64,
    #[serde(alias = "porcentaje", alias = "score")]
    pub percentage: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MatchesPayload {
    Bare(Vec<RemoteMatch>),
    Wrapped {
        #[serde(alias = "coincidencias")]
        matches: Vec<RemoteMatch>,
    },
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UploadCvReply {
    #[serde(default, alias = "mensaje")]
    pub message: Option<String>,
}

pub struct MatchingClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl MatchingClient {
    pub fn new(config: &MatchingConfig) -> Result<Self, reqwest::Error> {
        Self::with_policy(
            &config.base_url,
            Duration::from_secs(config.timeout_seconds),
            RetryPolicy::new(config.max_retries, config.backoff_base_ms, config.backoff_max_ms),
        )
    }

    pub fn with_policy(
        base_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn health(&self) -> Result<(), MatchingError> {
        let url = &self.url("/health");
        retry_with_backoff(&self.retry, "matching.health", || async move {
            let resp = self.client.get(url).send().await?;
            read_body(resp).await.map(|_| ())
        })
        .await
    }

    pub async fn candidate_matches(&self, candidate_id: i64) -> Result<Vec<RemoteMatch>, MatchingError> {
        let url = &self.url(&format!("/candidatos/{candidate_id}/matches"));
        let body = retry_with_backoff(&self.retry, "matching.candidate_matches", || async move {
            let resp = self.client.get(url).send().await?;
            read_body(resp).await
        })
        .await?;

        let payload: MatchesPayload =
            serde_json::from_slice(&body).map_err(|e| MatchingError::Decode(e.to_string()))?;
        let matches = match payload {
            MatchesPayload::Bare(m) => m,
            MatchesPayload::Wrapped { matches } => matches,
        };
        debug!(candidate_id, count = matches.len(), "matches fetched");
        Ok(matches)
    }

    pub async fn upload_cv(
        &self,
        candidate_id: i64,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadCvReply, MatchingError> {
        let url = &self.url(&format!("/candidatos/{candidate_id}/upload-cv"));
        let body = retry_with_backoff(&self.retry, "matching.upload_cv", || {
            let part = Part::bytes(bytes.clone())
                .file_name(filename.to_string())
                .mime_str(content_type);
            async move {
                let part = part.map_err(|e| MatchingError::Request(e.to_string()))?;
                let form = Form::new().part("file", part);
                let resp = self.client.post(url).multipart(form).send().await?;
                read_body(resp).await
            }
        })
        .await?;

        if body.is_empty() {
            return Ok(UploadCvReply::default());
        }
        // The reply body is informational; a non-JSON body still means success.
        Ok(serde_json::from_slice(&body).unwrap_or_default())
    }
}

async fn read_body(resp: reqwest::Response) -> Result<Vec<u8>, MatchingError> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        return Err(MatchingError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).chars().take(300).collect(),
        });
    }
    Ok(bytes.to_vec())
}
