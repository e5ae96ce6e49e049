//! `adb` implementation of the device protocol

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::{DeviceController, DeviceEntry, KeyCode, LaunchStrategy, parse_device_list};
use crate::config::DeviceConfig;
use crate::{Error, Result};

/// Remote path used as a scratch file for screen captures
const REMOTE_SCREENSHOT: &str = "/sdcard/screenshot.png";

const LAUNCHER_CATEGORY: &str = "android.intent.category.LAUNCHER";

/// Captured output of one `adb` invocation
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    status: String,
    stdout: String,
    stderr: String,
}

/// Drives a device by invoking the `adb` executable
#[derive(Debug, Clone)]
pub struct AdbController {
    adb: PathBuf,
    timeout: Duration,
}

impl AdbController {
    /// Create a controller for a known `adb` path
    #[must_use]
    pub const fn new(adb: PathBuf, timeout: Duration) -> Self {
        Self { adb, timeout }
    }

    /// Locate `adb` and create a controller
    ///
    /// # Errors
    ///
    /// Returns error if no `adb` executable can be found
    pub fn discover(config: &DeviceConfig) -> Result<Self> {
        let adb = find_adb(config.adb_path.as_deref())?;
        tracing::info!(path = %adb.display(), "using adb");
        Ok(Self::new(adb, config.command_timeout))
    }

    /// Path of the `adb` executable in use
    #[must_use]
    pub fn adb_path(&self) -> &Path {
        &self.adb
    }

    /// Run `adb` with arguments and capture its output
    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!(command = %args.join(" "), "executing adb");

        let child = tokio::process::Command::new(&self.adb)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Actuation(format!("failed to spawn {}: {e}", self.adb.display()))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Actuation(format!(
                    "adb {} timed out after {}s",
                    args.join(" "),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Actuation(format!("adb process error: {e}")))?;

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run `adb` and fail on a non-zero exit status
    async fn run_checked(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(args).await?;
        if !output.success {
            return Err(Error::Actuation(format!(
                "adb {} exited with {}: {}",
                args.join(" "),
                output.status,
                output.stderr.trim()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl DeviceController for AdbController {
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>> {
        let output = self.run_checked(&["devices"]).await?;
        Ok(parse_device_list(&output.stdout))
    }

    async fn tap(&self, x: u32, y: u32) -> Result<()> {
        let (x, y) = (x.to_string(), y.to_string());
        self.run_checked(&["shell", "input", "tap", &x, &y]).await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.run_checked(&["shell", "input", "text", text]).await?;
        Ok(())
    }

    async fn key_event(&self, key: KeyCode) -> Result<()> {
        let code = key.code().to_string();
        self.run_checked(&["shell", "input", "keyevent", &code]).await?;
        Ok(())
    }

    async fn is_installed(&self, package: &str) -> Result<bool> {
        let output = self.run(&["shell", "pm", "list", "packages", package]).await?;
        Ok(output.stdout.contains(package))
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        let output = self.run(&["shell", "pm", "list", "packages"]).await?;
        Ok(parse_package_list(&output.stdout))
    }

    async fn start_app(&self, package: &str, strategy: LaunchStrategy) -> Result<bool> {
        match strategy {
            LaunchStrategy::Monkey => {
                let output = self
                    .run(&["shell", "monkey", "-p", package, "-c", LAUNCHER_CATEGORY, "1"])
                    .await?;
                Ok(!output.stdout.contains("No activities found to run")
                    && !output.stderr.contains("No activities found"))
            }
            LaunchStrategy::MainActivity => {
                let component = format!("{package}/.MainActivity");
                let output = self.run(&["shell", "am", "start", "-n", &component]).await?;
                Ok(output.success && !output.stdout.contains("Error"))
            }
            LaunchStrategy::LauncherIntent => {
                let component = format!("{package}/");
                let output = self
                    .run(&[
                        "shell",
                        "am",
                        "start",
                        "-a",
                        "android.intent.action.MAIN",
                        "-c",
                        LAUNCHER_CATEGORY,
                        "-n",
                        &component,
                    ])
                    .await?;
                Ok(!output.stdout.contains("Error"))
            }
            LaunchStrategy::ComponentScan => {
                let output = self.run(&["shell", "dumpsys", "package", package]).await?;
                let Some(activity) = find_launchable_activity(package, &output.stdout) else {
                    tracing::debug!(package, "no activity components declared");
                    return Ok(false);
                };

                tracing::info!(package, activity = %activity, "launching discovered activity");
                self.run(&["shell", "am", "start", "-n", &activity]).await?;
                Ok(true)
            }
        }
    }

    async fn screenshot(&self, destination: &Path) -> Result<()> {
        self.run_checked(&["shell", "screencap", "-p", REMOTE_SCREENSHOT])
            .await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let local = destination.to_string_lossy();
        let output = self.run(&["pull", REMOTE_SCREENSHOT, &local]).await?;
        if !output.success {
            return Err(Error::Actuation(format!(
                "failed to pull screenshot: {}",
                output.stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Parse `pm list packages` output into bare package names
#[must_use]
pub fn parse_package_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.replace("package:", "").trim().to_string())
        .filter(|pkg| !pkg.is_empty())
        .collect()
}

/// First `<package>/...Activity` component in `dumpsys package` output
#[must_use]
pub fn find_launchable_activity(package: &str, dumpsys: &str) -> Option<String> {
    let pattern = format!(r"{}/[\w.]+Activity", regex::escape(package));
    let re = Regex::new(&pattern).ok()?;
    re.find(dumpsys).map(|m| m.as_str().to_string())
}

/// Locate the `adb` executable
///
/// Order: explicit path, `PATH`, `$ANDROID_SDK_ROOT`/`$ANDROID_HOME`, then
/// common SDK install locations.
///
/// # Errors
///
/// Returns error if no candidate exists
pub fn find_adb(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::Config(format!(
            "configured adb path does not exist: {}",
            path.display()
        )));
    }

    if let Ok(path) = which::which("adb") {
        return Ok(path);
    }

    let binary = if cfg!(windows) { "adb.exe" } else { "adb" };

    for var in ["ANDROID_SDK_ROOT", "ANDROID_HOME"] {
        if let Ok(root) = std::env::var(var) {
            let candidate = PathBuf::from(root).join("platform-tools").join(binary);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }

    let mut candidates = vec![
        PathBuf::from("/usr/local/android-sdk/platform-tools/adb"),
        PathBuf::from("/opt/android-sdk/platform-tools/adb"),
        PathBuf::from("C:/Android/platform-tools/adb.exe"),
        PathBuf::from("C:/Android/sdk/platform-tools/adb.exe"),
        PathBuf::from("C:/Program Files/Android/platform-tools/adb.exe"),
        PathBuf::from("C:/Program Files (x86)/Android/platform-tools/adb.exe"),
    ];
    if let Some(dirs) = directories::BaseDirs::new() {
        let home = dirs.home_dir();
        candidates.push(home.join("Android/Sdk/platform-tools/adb"));
        candidates.push(home.join("Library/Android/sdk/platform-tools/adb"));
        candidates.push(home.join("AppData/Local/Android/Sdk/platform-tools/adb.exe"));
    }

    candidates.into_iter().find(|p| p.exists()).ok_or_else(|| {
        Error::Config(
            "adb executable not found; install the Android SDK platform tools, \
             add adb to PATH, set ANDROID_SDK_ROOT/ANDROID_HOME, or set HANDSET_ADB_PATH"
                .to_string(),
        )
    })
}
