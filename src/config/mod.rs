//! Configuration management for the handset agent
//!
//! Values resolve as env > TOML file > default.

pub mod file;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::device::Pace;
use crate::{Error, Result};

use self::file::HandsetConfigFile;

/// Handset agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the status marker and screenshots
    pub data_dir: PathBuf,

    /// Device protocol configuration
    pub device: DeviceConfig,

    /// Language model endpoints
    pub llm: LlmConfig,

    /// Classifier tuning
    pub classifier: ClassifierConfig,

    /// Speech capture/output configuration
    pub speech: SpeechConfig,

    /// Capture/dispatch loop timing
    pub pipeline: PipelineConfig,

    /// HTTP API configuration
    pub api_server: ApiServerConfig,

    /// Extra app registry entries (friendly name → package)
    pub apps: BTreeMap<String, String>,
}

/// Device protocol configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Explicit `adb` path; discovered when `None`
    pub adb_path: Option<PathBuf>,

    /// Upper bound for a single protocol call
    pub command_timeout: Duration,

    /// Multiplier applied to scripted-flow delays (0 disables them)
    pub delay_scale: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: None,
            command_timeout: Duration::from_secs(30),
            delay_scale: 1.0,
        }
    }
}

/// Language model endpoint configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Bearer token for the endpoint
    pub api_key: Option<SecretString>,

    /// Model used for intent classification
    pub classifier_model: String,

    /// Model used to answer questions
    pub answer_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            classifier_model: "gpt-4o-mini".to_string(),
            answer_model: "gpt-4o-mini".to_string(),
        }
    }
}

/// Classifier tuning
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Attempts before the `general` fallback is used
    pub max_attempts: u32,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            temperature: 0.7,
        }
    }
}

/// Where utterances come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// One line of stdin per utterance
    #[default]
    Console,
    /// Run an external recognizer program per utterance
    Command,
}

impl CaptureMode {
    /// Parse from string
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "console" | "stdin" => Some(Self::Console),
            "command" | "recognizer" => Some(Self::Command),
            _ => None,
        }
    }
}

/// Speech capture/output configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// TTS program invoked with the utterance as its argument
    pub tts_command: String,

    /// Capture backend
    pub capture: CaptureMode,

    /// Recognizer program for [`CaptureMode::Command`]
    pub recognizer_command: Option<String>,

    /// Log utterances instead of speaking them
    pub muted: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_command: default_tts_command().to_string(),
            capture: CaptureMode::Console,
            recognizer_command: None,
            muted: false,
        }
    }
}

/// Capture/dispatch loop timing
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded wait for a queue poll
    pub poll_interval: Duration,

    /// Pause after a loop-level failure
    pub error_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// HTTP API configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

const fn default_tts_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "say"
    } else {
        "espeak"
    }
}

/// Default data directory (`~/.local/share/handset` on Linux)
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".handset"),
        |d| d.data_dir().join("handset"),
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            device: DeviceConfig::default(),
            llm: LlmConfig::default(),
            classifier: ClassifierConfig::default(),
            speech: SpeechConfig::default(),
            pipeline: PipelineConfig::default(),
            api_server: ApiServerConfig::default(),
            apps: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::resolve(fc, |key| std::env::var(key).ok())?;

        if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
            tracing::warn!(
                path = %config.data_dir.display(),
                error = %e,
                "failed to create data directory"
            );
        }

        Ok(config)
    }

    /// Merge an environment lookup over a parsed config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn resolve(
        fc: HandsetConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();

        let data_dir = env("HANDSET_DATA_DIR")
            .or(fc.data_dir)
            .map_or(defaults.data_dir, PathBuf::from);

        // Device config (env > toml > default)
        let device = DeviceConfig {
            adb_path: env("HANDSET_ADB_PATH")
                .or(fc.device.adb_path)
                .map(PathBuf::from),
            command_timeout: parse_env(&env, "HANDSET_COMMAND_TIMEOUT_SECS")?
                .or(fc.device.command_timeout_secs)
                .map_or(defaults.device.command_timeout, Duration::from_secs),
            delay_scale: parse_env(&env, "HANDSET_DELAY_SCALE")?
                .or(fc.device.delay_scale)
                .unwrap_or(defaults.device.delay_scale),
        };

        if !(0.0..=Pace::MAX_SCALE).contains(&device.delay_scale) {
            return Err(Error::Config(format!(
                "delay_scale must be between 0 and {}, got {}",
                Pace::MAX_SCALE,
                device.delay_scale
            )));
        }

        // LLM config (env > toml > default)
        let llm = LlmConfig {
            base_url: env("HANDSET_LLM_URL")
                .or(fc.llm.base_url)
                .unwrap_or(defaults.llm.base_url),
            api_key: env("HANDSET_LLM_API_KEY")
                .or_else(|| env("OPENAI_API_KEY"))
                .or(fc.llm.api_key)
                .filter(|k| !k.is_empty())
                .map(SecretString::from),
            classifier_model: env("HANDSET_CLASSIFIER_MODEL")
                .or(fc.llm.classifier_model)
                .unwrap_or(defaults.llm.classifier_model),
            answer_model: env("HANDSET_ANSWER_MODEL")
                .or(fc.llm.answer_model)
                .unwrap_or(defaults.llm.answer_model),
        };

        let classifier = ClassifierConfig {
            max_attempts: parse_env(&env, "HANDSET_CLASSIFIER_ATTEMPTS")?
                .or(fc.classifier.max_attempts)
                .unwrap_or(defaults.classifier.max_attempts),
            temperature: fc
                .classifier
                .temperature
                .unwrap_or(defaults.classifier.temperature),
        };

        if classifier.max_attempts == 0 {
            return Err(Error::Config(
                "classifier max_attempts must be at least 1".to_string(),
            ));
        }

        let capture = match env("HANDSET_CAPTURE").or(fc.speech.capture) {
            Some(raw) => CaptureMode::from_str(&raw)
                .ok_or_else(|| Error::Config(format!("unknown capture mode: {raw}")))?,
            None => defaults.speech.capture,
        };

        let speech = SpeechConfig {
            tts_command: env("HANDSET_TTS_COMMAND")
                .or(fc.speech.tts_command)
                .unwrap_or(defaults.speech.tts_command),
            capture,
            recognizer_command: env("HANDSET_RECOGNIZER_COMMAND").or(fc.speech.recognizer_command),
            muted: env("HANDSET_MUTED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.speech.muted)
                .unwrap_or(defaults.speech.muted),
        };

        if speech.capture == CaptureMode::Command && speech.recognizer_command.is_none() {
            return Err(Error::Config(
                "capture = \"command\" requires speech.recognizer_command".to_string(),
            ));
        }

        let pipeline = PipelineConfig {
            poll_interval: fc
                .pipeline
                .poll_interval_ms
                .map_or(defaults.pipeline.poll_interval, Duration::from_millis),
            error_backoff: fc
                .pipeline
                .error_backoff_ms
                .map_or(defaults.pipeline.error_backoff, Duration::from_millis),
        };

        let api_server = ApiServerConfig {
            port: parse_env(&env, "HANDSET_PORT")?
                .or(fc.server.port)
                .unwrap_or(defaults.api_server.port),
        };

        // Registry keys are matched lowercased
        let apps = fc
            .apps
            .into_iter()
            .map(|(name, package)| (name.trim().to_lowercase(), package.trim().to_string()))
            .collect();

        Ok(Self {
            data_dir,
            device,
            llm,
            classifier,
            speech,
            pipeline,
            api_server,
            apps,
        })
    }

    /// Path of the status marker file
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.data_dir.join("Status.data")
    }

    /// Directory where pulled screenshots are stored
    #[must_use]
    pub fn screenshot_dir(&self) -> PathBuf {
        self.data_dir.join("screenshots")
    }
}

/// Parse an optional env value, rejecting values that are present but malformed
fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}")))
        })
        .transpose()
}
