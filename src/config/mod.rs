//! Configuration management for the cub device
//!
//! Resolution order, lowest to highest: built-in defaults, the TOML config
//! file, environment variables. CLI flags are applied on top by `main`.

pub mod file;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::indicator::IndicatorPins;
use crate::{Error, Result};

use self::file::CubConfigFile;

/// Default capture rate (16kHz for speech)
pub const DEFAULT_RATE: u32 = 16000;

/// Default frames per capture callback (100ms at 16kHz)
pub const DEFAULT_CHUNK_SIZE: u32 = 1600;

/// Default activation phrase
pub const DEFAULT_ACTIVATION_PHRASE: &str = "hey cub";

/// Default reachability probe target
pub const DEFAULT_PROBE_URL: &str = "https://google.com";

/// Recognition sessions are recycled shortly before the provider's ~5 minute cap
const DEFAULT_MAX_SESSION_SECS: u64 = 290;

const DEFAULT_COOLDOWN_MS: u64 = 1000;

/// Device configuration
#[derive(Debug)]
pub struct Config {
    /// Microphone format
    pub audio: AudioConfig,

    /// Phrase that switches the device to question mode
    pub activation_phrase: String,

    /// Answer lookup service
    pub answer: AnswerConfig,

    /// Streaming recognizer
    pub stt: SttConfig,

    /// Speech synthesis
    pub tts: TtsConfig,

    /// Reachability probe target
    pub probe_url: String,

    /// Silence after each spoken response
    pub cooldown: Duration,

    /// Status lights
    pub indicator: IndicatorConfig,
}

/// Microphone format (mono, 16-bit PCM)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub rate: u32,

    /// Frames per capture callback
    pub chunk_size: u32,
}

/// Answer lookup service
#[derive(Debug)]
pub struct AnswerConfig {
    /// Lookup URL, queried with `?question=`
    pub endpoint: Option<String>,

    /// Shared secret sent as the `Authorization` header
    pub token: Option<SecretString>,
}

/// Streaming recognizer
#[derive(Debug)]
pub struct SttConfig {
    /// Deepgram API key
    pub api_key: Option<SecretString>,

    /// Recognizer model
    pub model: String,

    /// Maximum duration of one recognition session
    pub max_session: Duration,
}

/// Speech synthesis
#[derive(Debug)]
pub struct TtsConfig {
    /// Google Cloud API key
    pub api_key: Option<SecretString>,

    /// BCP-47 language tag
    pub language: String,

    /// SSML voice gender
    pub gender: String,
}

/// Status lights
#[derive(Debug, Clone, Copy)]
pub struct IndicatorConfig {
    /// Drive GPIO lights when the hardware is present
    pub enabled: bool,

    /// Pin assignment
    pub pins: IndicatorPins,
}

impl Config {
    /// Load configuration from the config file and process environment
    ///
    /// An explicit `path` must exist and parse; the default location is
    /// optional.
    ///
    /// # Errors
    ///
    /// Returns error if the explicit file is unreadable or a value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with environment lookups
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed
    pub fn from_sources(file: CubConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |key: &str, from_file: Option<String>| env(key).or(from_file);

        let audio = AudioConfig {
            rate: parse_env(&env, "CUB_RATE")?
                .or(file.audio.rate)
                .unwrap_or(DEFAULT_RATE),
            chunk_size: parse_env(&env, "CUB_CHUNK_SIZE")?
                .or(file.audio.chunk_size)
                .unwrap_or(DEFAULT_CHUNK_SIZE),
        };

        let activation_phrase = text("CUB_ACTIVATION_PHRASE", file.activation_phrase)
            .unwrap_or_else(|| DEFAULT_ACTIVATION_PHRASE.to_string());

        let answer = AnswerConfig {
            endpoint: text("CUB_ANSWER_ENDPOINT", file.answer.endpoint),
            token: text("CUB_ANSWER_TOKEN", file.answer.token).map(SecretString::from),
        };

        let stt = SttConfig {
            api_key: text("DEEPGRAM_API_KEY", file.stt.api_key).map(SecretString::from),
            model: text("CUB_STT_MODEL", file.stt.model).unwrap_or_else(|| "nova-2".to_string()),
            max_session: Duration::from_secs(
                parse_env(&env, "CUB_MAX_SESSION_SECS")?
                    .or(file.stt.max_session_secs)
                    .unwrap_or(DEFAULT_MAX_SESSION_SECS),
            ),
        };

        let tts = TtsConfig {
            api_key: text("GOOGLE_TTS_API_KEY", file.tts.api_key).map(SecretString::from),
            language: text("CUB_TTS_LANGUAGE", file.tts.language)
                .unwrap_or_else(|| "en-US".to_string()),
            gender: text("CUB_TTS_GENDER", file.tts.gender)
                .unwrap_or_else(|| "NEUTRAL".to_string()),
        };

        let probe_url =
            text("CUB_PROBE_URL", file.probe_url).unwrap_or_else(|| DEFAULT_PROBE_URL.to_string());

        let cooldown = Duration::from_millis(
            parse_env(&env, "CUB_COOLDOWN_MS")?
                .or(file.cooldown_ms)
                .unwrap_or(DEFAULT_COOLDOWN_MS),
        );

        let defaults = IndicatorPins::default();
        let indicator = IndicatorConfig {
            enabled: file.indicator.enabled.unwrap_or(true),
            pins: IndicatorPins {
                ready: file.indicator.ready.unwrap_or(defaults.ready),
                listening: file.indicator.listening.unwrap_or(defaults.listening),
                processing: file.indicator.processing.unwrap_or(defaults.processing),
            },
        };

        Ok(Self {
            audio,
            activation_phrase,
            answer,
            stt,
            tts,
            probe_url,
            cooldown,
            indicator,
        })
    }

    /// Check the settings the device loop cannot run without
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if self.audio.rate == 0 {
            return Err(Error::Config("audio rate must be positive".to_string()));
        }
        if self.audio.chunk_size == 0 {
            return Err(Error::Config("audio chunk size must be positive".to_string()));
        }
        if self.stt.max_session.is_zero() {
            return Err(Error::Config(
                "recognition session length must be positive (CUB_MAX_SESSION_SECS)".to_string(),
            ));
        }
        if self.activation_phrase.trim().is_empty() {
            return Err(Error::Config("activation phrase must not be empty".to_string()));
        }
        if self.answer.endpoint.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Config(
                "answer endpoint required (CUB_ANSWER_ENDPOINT)".to_string(),
            ));
        }
        if self.answer.token.is_none() {
            return Err(Error::Config(
                "answer token required (CUB_ANSWER_TOKEN)".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(env: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key} value {raw:?}: {e}")))
        })
        .transpose()
}
