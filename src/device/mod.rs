//! Android device control
//!
//! The [`DeviceController`] trait is the narrow capability surface over the
//! external device protocol. [`AdbController`] implements it by shelling out
//! to `adb`; the [`Actuator`] builds connectivity gating, app launch fallback
//! chains, system actions and scripted UI flows on top of it.

mod actuator;
mod adb;
mod flows;
mod registry;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;

pub use actuator::{Actuator, Connected, NO_DEVICE_MESSAGE, Pace, VolumeDirection};
pub use adb::{AdbController, find_adb, find_launchable_activity, parse_package_list};
pub use flows::{FlowStep, calendar_steps, clean_amount, payment_steps};
pub use registry::AppRegistry;

use crate::Result;

/// An entry from the attached-device listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// Device serial (e.g. "emulator-5554")
    pub serial: String,
    /// Connection state reported by the protocol ("device", "offline", ...)
    pub state: String,
}

impl DeviceEntry {
    /// Create an entry
    #[must_use]
    pub fn new(serial: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            state: state.into(),
        }
    }

    /// Whether the entry is flagged offline
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.state == "offline"
    }
}

/// Connectivity snapshot, recomputed before every actuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceSession {
    /// At least one device is online
    pub connected: bool,
    /// Number of online devices
    pub device_count: usize,
}

impl DeviceSession {
    /// Build a session from a device listing, ignoring offline entries
    #[must_use]
    pub fn from_entries(entries: &[DeviceEntry]) -> Self {
        let device_count = entries.iter().filter(|d| !d.is_offline()).count();
        Self {
            connected: device_count > 0,
            device_count,
        }
    }

    /// Session for a failed listing
    #[must_use]
    pub const fn disconnected() -> Self {
        Self {
            connected: false,
            device_count: 0,
        }
    }
}

/// Parse `adb devices` output
///
/// The first line is a header; blank lines are skipped.
#[must_use]
pub fn parse_device_list(stdout: &str) -> Vec<DeviceEntry> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let serial = parts.next()?;
            let state = parts.next().unwrap_or("unknown");
            Some(DeviceEntry::new(serial, state))
        })
        .collect()
}

/// Android key codes used by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Home,
    Back,
    VolumeUp,
    VolumeDown,
    Delete,
}

impl KeyCode {
    /// Numeric `KEYCODE_*` value
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Home => 3,
            Self::Back => 4,
            Self::VolumeUp => 24,
            Self::VolumeDown => 25,
            Self::Delete => 67,
        }
    }
}

/// One way of starting an application, tried in [`LaunchStrategy::ORDERED`] order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchStrategy {
    /// Launcher-intent broadcast through `monkey`
    Monkey,
    /// Explicit start of `<package>/.MainActivity`
    MainActivity,
    /// Generic MAIN/LAUNCHER start intent
    LauncherIntent,
    /// Scan the package's declared components for an `...Activity`
    ComponentScan,
}

impl LaunchStrategy {
    /// The fixed fallback order
    pub const ORDERED: [Self; 4] = [
        Self::Monkey,
        Self::MainActivity,
        Self::LauncherIntent,
        Self::ComponentScan,
    ];

    /// Short name for logging
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monkey => "monkey",
            Self::MainActivity => "main_activity",
            Self::LauncherIntent => "launcher_intent",
            Self::ComponentScan => "component_scan",
        }
    }
}

impl std::fmt::Display for LaunchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a device operation, used for logging, speech and the HTTP API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

impl ActionResult {
    /// Successful outcome
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            artifact_path: None,
        }
    }

    /// Failed outcome
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            artifact_path: None,
        }
    }

    /// Attach a local artifact (e.g. a pulled screenshot)
    #[must_use]
    pub fn with_artifact(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }
}

/// Capability surface of the external device-control protocol
///
/// Implementations report protocol-level failures as errors; a launch
/// attempt that ran but did not start anything returns `Ok(false)`.
#[async_trait]
pub trait DeviceController: Send + Sync {
    /// List attached devices
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>>;

    /// Tap at screen coordinates
    async fn tap(&self, x: u32, y: u32) -> Result<()>;

    /// Inject already-escaped text
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Send a key event
    async fn key_event(&self, key: KeyCode) -> Result<()>;

    /// Exact install query for a package
    async fn is_installed(&self, package: &str) -> Result<bool>;

    /// All installed packages
    async fn list_packages(&self) -> Result<Vec<String>>;

    /// Try to start a package with one strategy
    async fn start_app(&self, package: &str, strategy: LaunchStrategy) -> Result<bool>;

    /// Capture the screen and store it at `destination` on the host
    async fn screenshot(&self, destination: &Path) -> Result<()>;
}

/// How text is escaped before `input text`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeStyle {
    /// Backslash-escape quotes and whitespace
    Posix,
    /// Encode spaces as `%s`
    Windows,
}

impl EscapeStyle {
    /// Style for the host running the agent
    #[must_use]
    pub const fn host() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Posix }
    }
}

static POSIX_SPECIALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(["'\s])"#).expect("static pattern"));

/// Escape text for the device's `input text` command
#[must_use]
pub fn escape_input_text(text: &str, style: EscapeStyle) -> String {
    match style {
        EscapeStyle::Windows => text.replace(' ', "%s"),
        EscapeStyle::Posix => POSIX_SPECIALS.replace_all(text, r"\$1").into_owned(),
    }
}
