//! Answer lookup client
//!
//! The answer service owns the question bank. Given a spoken question it
//! returns its closest stored question, that question's answer, and how
//! confident the match is.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::AnswerConfig;
use crate::{Error, Result};

/// Upper bound on one lookup, connection included
pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Best match returned by the answer service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Closest stored question
    pub question: String,
    /// Answer to that question
    pub answer: String,
    /// Match confidence, 0 to 100
    pub accuracy: u32,
    /// How often the stored question has been asked
    pub times_asked: u32,
}

/// Looks up answers to spoken questions
#[async_trait]
pub trait AnswerService: Send + Sync {
    /// Find the best answer for `question`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] on transport failure, non-success status,
    /// or an unparsable body
    async fn lookup(&self, question: &str) -> Result<AnswerRecord>;
}

/// HTTP client for the answer service
pub struct AnswerClient {
    client: reqwest::Client,
    endpoint: url::Url,
    token: SecretString,
}

impl AnswerClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint or token is missing, or the endpoint is not a URL
    pub fn new(config: AnswerConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .ok_or_else(|| Error::Config("answer endpoint required".to_string()))?;
        let endpoint = url::Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("invalid answer endpoint {endpoint:?}: {e}")))?;
        let token = config
            .token
            .ok_or_else(|| Error::Config("answer token required".to_string()))?;

        Ok(Self {
            client: http_client(LOOKUP_TIMEOUT)?,
            endpoint,
            token,
        })
    }

    /// Replace the per-lookup timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = http_client(timeout)?;
        Ok(self)
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))
}

#[async_trait]
impl AnswerService for AnswerClient {
    async fn lookup(&self, question: &str) -> Result<AnswerRecord> {
        tracing::debug!(question, "looking up answer");

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("question", question)])
            .header("Authorization", self.token.expose_secret())
            .send()
            .await
            .map_err(|e| Error::Service(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Service(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Service(format!("status {status}: {body}")));
        }

        let record: AnswerRecord = serde_json::from_str(&body)
            .map_err(|e| Error::Service(format!("unparsable response: {e}")))?;

        tracing::info!(
            matched = %record.question,
            accuracy = record.accuracy,
            times_asked = record.times_asked,
            "answer received"
        );
        Ok(record)
    }
}
