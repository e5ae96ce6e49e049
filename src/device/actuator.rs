//! Connectivity gating, app launch and system actions

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{
    ActionResult, AppRegistry, DeviceController, DeviceSession, EscapeStyle, KeyCode,
    LaunchStrategy, escape_input_text,
};
use crate::voice::SpeechSink;
use crate::{Error, Result};

/// Spoken when an actuation is attempted without an online device
pub const NO_DEVICE_MESSAGE: &str =
    "No Android device connected. Please connect a device and try again.";

/// Delay between characters in the per-character text fallback
const CHAR_DELAY: Duration = Duration::from_millis(100);

/// Scales every fixed actuation delay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pace {
    scale: f64,
}

impl Pace {
    /// Largest accepted delay multiplier
    pub const MAX_SCALE: f64 = 100.0;

    /// Create a pace; negative or non-finite factors collapse to zero and
    /// large ones are capped at [`Self::MAX_SCALE`]
    #[must_use]
    pub fn new(scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 {
            scale.min(Self::MAX_SCALE)
        } else {
            0.0
        };
        Self { scale }
    }

    /// No delays at all
    #[must_use]
    pub const fn instant() -> Self {
        Self { scale: 0.0 }
    }

    /// Scaled length of a base delay
    #[must_use]
    pub fn scaled(&self, base: Duration) -> Duration {
        Duration::try_from_secs_f64(base.as_secs_f64() * self.scale).unwrap_or(Duration::MAX)
    }

    /// Sleep for the scaled delay
    pub async fn pause(&self, base: Duration) {
        let delay = self.scaled(base);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for Pace {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

/// Direction for the volume system action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    Up,
    Down,
}

impl VolumeDirection {
    /// Parse "up" / "down"
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }

    const fn key(self) -> KeyCode {
        match self {
            Self::Up => KeyCode::VolumeUp,
            Self::Down => KeyCode::VolumeDown,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// High-level device actions with spoken feedback
///
/// Every method that touches the device first recomputes the connectivity
/// session; with no online device it speaks [`NO_DEVICE_MESSAGE`] and returns
/// `None` without issuing any further protocol call.
pub struct Actuator {
    device: Arc<dyn DeviceController>,
    registry: Arc<AppRegistry>,
    speech: SpeechSink,
    screenshot_dir: PathBuf,
    escape: EscapeStyle,
    pace: Pace,
}

impl Actuator {
    /// Create an actuator
    #[must_use]
    pub fn new(
        device: Arc<dyn DeviceController>,
        registry: Arc<AppRegistry>,
        speech: SpeechSink,
        screenshot_dir: PathBuf,
    ) -> Self {
        Self {
            device,
            registry,
            speech,
            screenshot_dir,
            escape: EscapeStyle::host(),
            pace: Pace::default(),
        }
    }

    /// Override delay scaling
    #[must_use]
    pub const fn with_pace(mut self, pace: Pace) -> Self {
        self.pace = pace;
        self
    }

    /// Override the text escaping style
    #[must_use]
    pub const fn with_escape(mut self, escape: EscapeStyle) -> Self {
        self.escape = escape;
        self
    }

    /// The underlying protocol client
    #[must_use]
    pub fn device(&self) -> &Arc<dyn DeviceController> {
        &self.device
    }

    /// The app registry
    #[must_use]
    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub(super) const fn pace(&self) -> Pace {
        self.pace
    }

    pub(super) fn speak(&self, text: &str) {
        self.speech.speak(text);
    }

    /// Fresh connectivity snapshot; a failed listing counts as disconnected
    pub async fn session(&self) -> DeviceSession {
        match self.device.list_devices().await {
            Ok(entries) => DeviceSession::from_entries(&entries),
            Err(e) => {
                tracing::warn!(error = %e, "device listing failed");
                DeviceSession::disconnected()
            }
        }
    }

    /// Connectivity gate; speaks the no-device message when closed
    pub async fn ensure_connected(&self) -> bool {
        let session = self.session().await;
        if !session.connected {
            tracing::warn!("no device connected");
            self.speech.speak(NO_DEVICE_MESSAGE);
        }
        session.connected
    }

    /// Pass the connectivity gate, yielding the device actions
    pub async fn connected(&self) -> Option<Connected<'_>> {
        self.ensure_connected()
            .await
            .then_some(Connected { actuator: self })
    }

    /// Open an app by friendly name
    ///
    /// The registry is consulted before the device; an unknown name fails
    /// without any protocol call.
    pub async fn open_app(&self, name: &str) -> Option<ActionResult> {
        let name = name.trim();
        let Some(package) = self.registry.lookup(name) else {
            return Some(self.unknown_app(name));
        };

        let package = package.to_string();
        Some(self.connected().await?.open_package(&package, name).await)
    }

    /// Step the media volume
    pub async fn volume(&self, direction: VolumeDirection) -> Option<ActionResult> {
        Some(self.connected().await?.volume(direction).await)
    }

    /// Go to the home screen
    pub async fn home(&self) -> Option<ActionResult> {
        Some(self.connected().await?.home().await)
    }

    /// Navigate back
    pub async fn back(&self) -> Option<ActionResult> {
        Some(self.connected().await?.back().await)
    }

    /// Capture the screen into the screenshot directory
    pub async fn screenshot(&self) -> Option<ActionResult> {
        Some(self.connected().await?.screenshot().await)
    }

    fn unknown_app(&self, name: &str) -> ActionResult {
        tracing::info!(app = name, "app not in registry");
        let message = format!("Sorry, I couldn't find the app {name}.");
        self.speech.speak(&message);
        ActionResult::failure(message)
    }

    /// Type text, falling back to one character at a time
    ///
    /// # Errors
    ///
    /// Returns error if a character fails in the fallback path
    pub async fn enter_text(&self, text: &str) -> Result<()> {
        let escaped = escape_input_text(text, self.escape);
        match self.device.type_text(&escaped).await {
            Ok(()) => return Ok(()),
            Err(e) => tracing::warn!(error = %e, "batch text input failed, typing per character"),
        }

        let mut first = true;
        for c in text.chars() {
            if !first {
                self.pace.pause(CHAR_DELAY).await;
            }
            first = false;

            let encoded = if c == ' ' {
                "%s".to_string()
            } else {
                escape_input_text(&c.to_string(), self.escape)
            };
            self.device.type_text(&encoded).await?;
        }
        Ok(())
    }
}

/// Device actions available once the connectivity gate has passed
#[derive(Debug, Clone, Copy)]
pub struct Connected<'a> {
    actuator: &'a Actuator,
}

impl Connected<'_> {
    /// The actuator behind this gate
    #[must_use]
    pub const fn actuator(&self) -> &Actuator {
        self.actuator
    }

    /// Open an app by friendly name
    pub async fn open_app(&self, name: &str) -> ActionResult {
        let name = name.trim();
        match self.actuator.registry.lookup(name) {
            Some(package) => {
                let package = package.to_string();
                self.open_package(&package, name).await
            }
            None => self.actuator.unknown_app(name),
        }
    }

    /// Open a package, announcing it under `display`
    pub async fn open_package(&self, package: &str, display: &str) -> ActionResult {
        let outcome = match self.resolve_installed(package).await {
            Ok(resolved) => self.launch(&resolved).await,
            Err(e) => Err(e),
        };

        let result = match outcome {
            Ok(strategy) => {
                tracing::info!(package, strategy = %strategy, "app launched");
                ActionResult::success(format!("Opening {display}"))
            }
            Err(Error::AppNotInstalled(_)) => ActionResult::failure(format!(
                "The app {display} doesn't seem to be installed on the device."
            )),
            Err(Error::LaunchFailed(_)) => ActionResult::failure(format!(
                "I had trouble opening {display}. The app might be installed but not accessible."
            )),
            Err(e) => {
                tracing::error!(package, error = %e, "failed to open app");
                ActionResult::failure(format!("Failed to open {display}"))
            }
        };

        self.actuator.speech.speak(&result.message);
        result
    }

    /// Confirm a package is installed, falling back to a loose search
    async fn resolve_installed(&self, package: &str) -> Result<String> {
        let device = &self.actuator.device;
        if device.is_installed(package).await? {
            return Ok(package.to_string());
        }

        let packages = device.list_packages().await?;
        packages
            .into_iter()
            .find(|p| p.contains(package))
            .inspect(|p| tracing::info!(requested = package, resolved = %p, "loose package match"))
            .ok_or_else(|| Error::AppNotInstalled(package.to_string()))
    }

    /// Try each strategy in order, stopping at the first success
    async fn launch(&self, package: &str) -> Result<LaunchStrategy> {
        for strategy in LaunchStrategy::ORDERED {
            match self.actuator.device.start_app(package, strategy).await {
                Ok(true) => return Ok(strategy),
                Ok(false) => {
                    tracing::debug!(package, strategy = %strategy, "launch strategy failed");
                }
                Err(e) => {
                    tracing::warn!(package, strategy = %strategy, error = %e, "launch strategy errored");
                }
            }
        }
        Err(Error::LaunchFailed(package.to_string()))
    }

    /// Step the media volume
    pub async fn volume(&self, direction: VolumeDirection) -> ActionResult {
        let (ok, failed) = match direction {
            VolumeDirection::Up => ("Increasing volume", "Failed to adjust volume up"),
            VolumeDirection::Down => ("Decreasing volume", "Failed to adjust volume down"),
        };
        tracing::debug!(direction = direction.as_str(), "volume");
        self.key_action(direction.key(), ok, failed).await
    }

    /// Go to the home screen
    pub async fn home(&self) -> ActionResult {
        self.key_action(KeyCode::Home, "Going to home screen", "Failed to go to home screen")
            .await
    }

    /// Navigate back
    pub async fn back(&self) -> ActionResult {
        self.key_action(KeyCode::Back, "Going back", "Failed to go back")
            .await
    }

    async fn key_action(&self, key: KeyCode, ok: &str, failed: &str) -> ActionResult {
        let result = match self.actuator.device.key_event(key).await {
            Ok(()) => ActionResult::success(ok),
            Err(e) => {
                tracing::error!(key = key.code(), error = %e, "key event failed");
                ActionResult::failure(failed)
            }
        };
        self.actuator.speech.speak(&result.message);
        result
    }

    /// Capture the screen into the screenshot directory
    pub async fn screenshot(&self) -> ActionResult {
        let name = format!(
            "screenshot_{}.png",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let destination = self.actuator.screenshot_dir.join(name);

        let result = match self.actuator.device.screenshot(&destination).await {
            Ok(()) => {
                tracing::info!(path = %destination.display(), "screenshot saved");
                ActionResult::success("Screenshot taken and saved").with_artifact(destination)
            }
            Err(e) => {
                tracing::error!(error = %e, "screenshot failed");
                ActionResult::failure("Failed to take screenshot")
            }
        };
        self.actuator.speech.speak(&result.message);
        result
    }
}

impl std::fmt::Debug for Actuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actuator")
            .field("apps", &self.registry.len())
            .field("screenshot_dir", &self.screenshot_dir)
            .field("escape", &self.escape)
            .field("pace", &self.pace)
            .finish_non_exhaustive()
    }
}
