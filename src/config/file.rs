//! TOML configuration file loading
//!
//! Supports `~/.config/cub/config.toml` as a persistent config source.
//! All fields are optional; the file overlays the built-in defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CubConfigFile {
    /// Phrase that wakes the device (e.g. "hey cub")
    pub activation_phrase: Option<String>,

    /// URL used for the reachability probe
    pub probe_url: Option<String>,

    /// Silence after each spoken response, in milliseconds
    pub cooldown_ms: Option<u64>,

    /// Microphone configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Answer service configuration
    #[serde(default)]
    pub answer: AnswerFileConfig,

    /// Streaming recognizer configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Status light configuration
    #[serde(default)]
    pub indicator: IndicatorFileConfig,
}

/// Microphone configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Capture sample rate in Hz
    pub rate: Option<u32>,

    /// Frames per capture callback
    pub chunk_size: Option<u32>,
}

/// Answer service configuration
#[derive(Debug, Default, Deserialize)]
pub struct AnswerFileConfig {
    pub endpoint: Option<String>,
    pub token: Option<String>,
}

/// Streaming recognizer configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    pub api_key: Option<String>,

    /// Recognizer model (e.g. "nova-2")
    pub model: Option<String>,

    /// Longest single recognition session before it is restarted
    pub max_session_secs: Option<u64>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    pub api_key: Option<String>,

    /// BCP-47 language tag (e.g. "en-US")
    pub language: Option<String>,

    /// SSML voice gender ("NEUTRAL", "FEMALE", "MALE")
    pub gender: Option<String>,
}

/// Status light configuration
#[derive(Debug, Default, Deserialize)]
pub struct IndicatorFileConfig {
    pub enabled: Option<bool>,
    pub ready: Option<u8>,
    pub listening: Option<u8>,
    pub processing: Option<u8>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CubConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CubConfigFile {
    let Some(path) = config_file_path() else {
        return CubConfigFile::default();
    };

    if !path.exists() {
        return CubConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            CubConfigFile::default()
        }
    }
}

/// Read and parse a specific config file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<CubConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/cub/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("cub").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file() {
        let file: CubConfigFile = toml::from_str(
            r#"
            activation_phrase = "hey cub"

            [audio]
            rate = 44100

            [indicator]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(file.activation_phrase.as_deref(), Some("hey cub"));
        assert_eq!(file.audio.rate, Some(44100));
        assert_eq!(file.audio.chunk_size, None);
        assert_eq!(file.indicator.enabled, Some(false));
        assert!(file.answer.endpoint.is_none());
    }

    #[test]
    fn test_read_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "audio = [").unwrap();
        assert!(matches!(
            read_config_file(&path),
            Err(crate::Error::Toml(_))
        ));
    }
}
