//! Text-to-speech (TTS) processing

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::config::TtsConfig;
use crate::{Error, Result};

const GOOGLE_SYNTHESIZE_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";

/// Upper bound on one synthesis request
pub const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(15);

/// Turns text into playable audio
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize text to speech
    ///
    /// Returns WAV bytes (linear 16-bit PCM)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Google Cloud Text-to-Speech over REST
pub struct GoogleTts {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    language: String,
    gender: String,
}

impl GoogleTts {
    /// Create a new TTS instance
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: TtsConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| Error::Config("Google API key required for TTS".to_string()))?;

        Ok(Self {
            client: http_client(SYNTHESIS_TIMEOUT)?,
            endpoint: GOOGLE_SYNTHESIZE_URL.to_string(),
            api_key,
            language: config.language,
            gender: config.gender,
        })
    }

    /// Send requests to another `text:synthesize` URL
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Replace the per-request timeout
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
impl Synthesizer for GoogleTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct Input<'a> {
            text: &'a str,
        }

        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Voice<'a> {
            language_code: &'a str,
            ssml_gender: &'a str,
        }

        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct AudioConfig {
            audio_encoding: &'static str,
        }

        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SynthesizeRequest<'a> {
            input: Input<'a>,
            voice: Voice<'a>,
            audio_config: AudioConfig,
        }

        let request = SynthesizeRequest {
            input: Input { text },
            voice: Voice {
                language_code: &self.language,
                ssml_gender: &self.gender,
            },
            audio_config: AudioConfig {
                audio_encoding: "LINEAR16",
            },
        };

        tracing::debug!(chars = text.len(), "requesting synthesis");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("Google TTS error {status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        decode_audio_content(&body)
    }
}

/// Extract the audio from a `text:synthesize` response body
///
/// # Errors
///
/// Returns error if the body is not JSON, lacks audio, or is not base64
pub fn decode_audio_content(body: &str) -> Result<Vec<u8>> {
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SynthesizeResponse {
        audio_content: Option<String>,
    }

    let parsed: SynthesizeResponse = serde_json::from_str(body)
        .map_err(|e| Error::Synthesis(format!("unparsable response: {e}")))?;
    let content = parsed
        .audio_content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| Error::Synthesis("response has no audio content".to_string()))?;

    base64::engine::general_purpose::STANDARD
        .decode(content)
        .map_err(|e| Error::Synthesis(format!("invalid audio encoding: {e}")))
}
