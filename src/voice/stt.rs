//! Streaming speech-to-text (STT)
//!
//! Audio batches go up a WebSocket as binary frames; recognition results
//! come back as JSON messages and are surfaced as a stream of
//! [`RecognitionResponse`] values, one final response per utterance. The
//! session ends with [`Error::StreamLimitExceeded`] once its maximum
//! duration elapses.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use super::buffer::AudioChunk;
use crate::config::SttConfig;
use crate::{Error, Result};

const DEEPGRAM_LISTEN_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Silence gap after which the service reports an utterance end
const UTTERANCE_END_MS: &str = "1000";

/// Audio sent to the recognizer, in capture order
pub type AudioStream = BoxStream<'static, AudioChunk>;

/// Recognition responses in the order the service emits them
pub type TranscriptStream = BoxStream<'static, Result<RecognitionResponse>>;

/// One message from the recognizer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionResponse {
    pub results: Vec<RecognitionResult>,
}

/// A recognized segment with its candidate transcripts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionResult {
    /// Ordered by descending confidence
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    #[serde(default)]
    pub confidence: f32,
}

/// The top transcript of a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

impl RecognitionResponse {
    /// Build a single-result response
    #[must_use]
    pub fn single(transcript: &str, is_final: bool) -> Self {
        Self {
            results: vec![RecognitionResult {
                alternatives: vec![Alternative {
                    transcript: transcript.to_string(),
                    confidence: 1.0,
                }],
                is_final,
            }],
        }
    }

    /// Top alternative of the first result, if there is one
    #[must_use]
    pub fn top_event(&self) -> Option<TranscriptEvent> {
        let result = self.results.first()?;
        let alternative = result.alternatives.first()?;
        Some(TranscriptEvent {
            text: alternative.transcript.clone(),
            is_final: result.is_final,
        })
    }
}

/// Opens streaming recognition sessions
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Start recognizing `audio`
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be established
    async fn open(&self, audio: AudioStream) -> Result<TranscriptStream>;
}

/// Live transcription over Deepgram's streaming API
pub struct DeepgramStreaming {
    api_key: SecretString,
    model: String,
    sample_rate: u32,
    max_duration: Duration,
}

impl DeepgramStreaming {
    /// Create a new streaming transcriber
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: SttConfig, sample_rate: u32) -> Result<Self> {
        let api_key = config
            .api_key
            .ok_or_else(|| Error::Config("Deepgram API key required for STT".to_string()))?;

        Ok(Self {
            api_key,
            model: config.model,
            sample_rate,
            max_duration: config.max_session,
        })
    }

    fn listen_url(&self) -> Result<url::Url> {
        url::Url::parse_with_params(
            DEEPGRAM_LISTEN_URL,
            &[
                ("model", self.model.as_str()),
                ("encoding", "linear16"),
                ("sample_rate", &self.sample_rate.to_string()),
                ("channels", "1"),
                ("interim_results", "true"),
                ("utterance_end_ms", UTTERANCE_END_MS),
            ],
        )
        .map_err(|e| Error::Config(format!("invalid listen url: {e}")))
    }
}

#[async_trait]
impl Transcriber for DeepgramStreaming {
    async fn open(&self, mut audio: AudioStream) -> Result<TranscriptStream> {
        let url = self.listen_url()?;
        let mut request = url.as_str().into_client_request()?;
        let auth = HeaderValue::from_str(&format!("Token {}", self.api_key.expose_secret()))
            .map_err(|e| Error::Config(format!("invalid Deepgram API key: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let (socket, _) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(model = %self.model, "transcription session opened");

        let (mut sink, mut source) = socket.split();

        let uplink = tokio::spawn(async move {
            while let Some(batch) = audio.next().await {
                if let Err(e) = sink.send(Message::Binary(batch)).await {
                    tracing::debug!(error = %e, "audio uplink closed");
                    return;
                }
            }
            // Capture closed: ask the service to flush and finish
            let _ = sink
                .send(Message::Text(r#"{"type":"CloseStream"}"#.to_string()))
                .await;
        });

        let (tx, rx) = mpsc::channel::<Result<RecognitionResponse>>(32);
        let max_duration = self.max_duration;

        tokio::spawn(async move {
            let mut utterance = Utterance::default();
            let deadline = tokio::time::sleep(max_duration);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    () = &mut deadline => {
                        tracing::debug!(?max_duration, "transcription session reached its duration limit");
                        let _ = tx.send(Err(Error::StreamLimitExceeded)).await;
                        break;
                    }
                    message = source.next() => match message {
                        Some(Ok(Message::Text(text))) => match utterance.accept(&text) {
                            Ok(Some(response)) => {
                                if tx.send(Ok(response)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                break;
                            }
                        },
                        Some(Ok(Message::Close(frame))) => {
                            tracing::debug!(?frame, "transcription session closed by server");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = tx.send(Err(e.into())).await;
                            break;
                        }
                        None => break,
                    }
                }
            }

            uplink.abort();
        });

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

#[derive(Deserialize)]
struct DeepgramMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<DeepgramChannel>,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<Alternative>,
}

/// Joins finalized segments into one transcript per spoken utterance
///
/// The service finalizes audio in segments (`is_final`) and marks the end
/// of speech separately (`speech_final`, or an `UtteranceEnd` message).
/// Segments are held back and surfaced as interim text until the utterance
/// ends, so each utterance produces exactly one final response.
#[derive(Debug, Default)]
struct Utterance {
    segments: Vec<String>,
}

impl Utterance {
    /// Feed one server message; non-result messages yield `None`
    ///
    /// Blank transcripts are dropped, so silence shows up as a response
    /// without alternatives.
    fn accept(&mut self, text: &str) -> Result<Option<RecognitionResponse>> {
        let message: DeepgramMessage = serde_json::from_str(text)
            .map_err(|e| Error::Transcription(format!("unparsable message: {e}")))?;

        match message.kind.as_str() {
            "Results" => {
                let top = message
                    .channel
                    .and_then(|c| c.alternatives.into_iter().next())
                    .filter(|a| !a.transcript.trim().is_empty());

                if !message.is_final {
                    let pending = top.map(|a| self.joined_with(&a.transcript));
                    return Ok(Some(response(pending, false)));
                }

                if let Some(alternative) = top {
                    self.segments.push(alternative.transcript.trim().to_string());
                }
                if message.speech_final {
                    Ok(Some(response(self.take(), true)))
                } else {
                    Ok(Some(response(self.joined(), false)))
                }
            }
            "UtteranceEnd" => Ok(self.take().map(|text| response(Some(text), true))),
            "Error" => Err(Error::Transcription(text.to_string())),
            _ => Ok(None),
        }
    }

    fn joined(&self) -> Option<String> {
        (!self.segments.is_empty()).then(|| self.segments.join(" "))
    }

    fn joined_with(&self, partial: &str) -> String {
        match self.joined() {
            Some(done) => format!("{done} {}", partial.trim()),
            None => partial.trim().to_string(),
        }
    }

    fn take(&mut self) -> Option<String> {
        let text = self.joined();
        self.segments.clear();
        text
    }
}

fn response(transcript: Option<String>, is_final: bool) -> RecognitionResponse {
    RecognitionResponse {
        results: vec![RecognitionResult {
            alternatives: transcript
                .map(|transcript| Alternative {
                    transcript,
                    confidence: 1.0,
                })
                .into_iter()
                .collect(),
            is_final,
        }],
    }
}
