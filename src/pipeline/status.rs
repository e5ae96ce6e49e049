//! Status marker file

use std::path::{Path, PathBuf};

/// Agent activity shown to external observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Listening,
    Thinking,
    Answering,
    Executing,
    Available,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Listening => "Listening...",
            Self::Thinking => "Thinking...",
            Self::Answering => "Answering...",
            Self::Executing => "Executing...",
            Self::Available => "Available...",
        }
    }
}

/// Overwrites a plain-text file with the current [`Status`]
#[derive(Debug, Clone, Default)]
pub struct StatusMarker {
    path: Option<PathBuf>,
}

impl StatusMarker {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// Marker that writes nothing
    #[must_use]
    pub const fn disabled() -> Self {
        Self { path: None }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a status; write failures are logged only
    pub fn set(&self, status: Status) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = std::fs::write(path, status.as_str()) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write status marker");
        }
    }
}
