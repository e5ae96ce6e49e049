//! TOML configuration file loading
//!
//! Supports `~/.config/handset/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HandsetConfigFile {
    /// Directory for the status marker and screenshots
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Device protocol configuration
    #[serde(default)]
    pub device: DeviceFileConfig,

    /// Language model endpoints
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Classifier tuning
    #[serde(default)]
    pub classifier: ClassifierFileConfig,

    /// Speech capture/output configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Capture/dispatch loop timing
    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// HTTP API configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Extra friendly-name → package entries for the app registry
    #[serde(default)]
    pub apps: BTreeMap<String, String>,
}

/// Device protocol configuration
#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    /// Explicit path to the `adb` executable
    pub adb_path: Option<String>,

    /// Upper bound for a single protocol call
    pub command_timeout_secs: Option<u64>,

    /// Multiplier applied to scripted-flow delays
    pub delay_scale: Option<f64>,
}

/// Language model configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// OpenAI-compatible base URL (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,

    /// API key for the endpoint
    pub api_key: Option<String>,

    /// Model used for intent classification
    pub classifier_model: Option<String>,

    /// Model used to answer questions
    pub answer_model: Option<String>,
}

/// Classifier tuning
#[derive(Debug, Default, Deserialize)]
pub struct ClassifierFileConfig {
    /// Attempts before falling back to `general`
    pub max_attempts: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// Speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// TTS program (e.g. "espeak", "say")
    pub tts_command: Option<String>,

    /// Capture backend: "console" or "command"
    pub capture: Option<String>,

    /// Recognizer program for the "command" capture backend
    pub recognizer_command: Option<String>,

    /// Log utterances instead of speaking them
    pub muted: Option<bool>,
}

/// Loop timing
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Bounded wait for a queue poll
    pub poll_interval_ms: Option<u64>,

    /// Pause after a loop-level failure
    pub error_backoff_ms: Option<u64>,
}

/// HTTP API configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HandsetConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HandsetConfigFile {
    let Some(path) = config_file_path() else {
        return HandsetConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
pub fn load_config_file_from(path: &Path) -> HandsetConfigFile {
    if !path.exists() {
        return HandsetConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HandsetConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HandsetConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/handset/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("handset").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let fc: HandsetConfigFile = toml::from_str(
            r#"
            [device]
            adb_path = "/opt/sdk/platform-tools/adb"

            [apps]
            "work chat" = "com.slack"
            "#,
        )
        .unwrap();

        assert_eq!(
            fc.device.adb_path.as_deref(),
            Some("/opt/sdk/platform-tools/adb")
        );
        assert!(fc.device.command_timeout_secs.is_none());
        assert_eq!(fc.apps.get("work chat").map(String::as_str), Some("com.slack"));
        assert!(fc.llm.base_url.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let fc = load_config_file_from(&dir.path().join("absent.toml"));
        assert!(fc.apps.is_empty());
        assert!(fc.data_dir.is_none());
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[device\nadb_path = ").unwrap();

        let fc = load_config_file_from(&path);
        assert!(fc.device.adb_path.is_none());
    }
}
