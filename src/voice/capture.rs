//! Speech capture backends

use std::io::BufRead;
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use crate::{Error, Result};

/// Blocking source of recognized utterances
///
/// `listen` blocks until one utterance is available and returns its
/// normalized text. An utterance that produced no usable text is
/// [`Error::SpeechUnclear`]; a source that can never produce more is
/// [`Error::InputClosed`].
pub trait SpeechCapture: Send + Sync {
    fn listen(&self) -> Result<String>;
}

/// Trim, lowercase and collapse inner whitespace
#[must_use]
pub fn normalize_utterance(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Reads one typed line per utterance
pub struct ConsoleCapture {
    input: Mutex<Box<dyn BufRead + Send>>,
}

impl ConsoleCapture {
    pub fn new(input: Box<dyn BufRead + Send>) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }

    /// Capture from standard input
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(Box::new(std::io::BufReader::new(std::io::stdin())))
    }
}

impl SpeechCapture for ConsoleCapture {
    fn listen(&self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_line(&mut line)?;

        if read == 0 {
            return Err(Error::InputClosed);
        }

        let text = normalize_utterance(&line);
        if text.is_empty() {
            return Err(Error::SpeechUnclear);
        }
        Ok(text)
    }
}

/// Runs an external recognizer that records one utterance and prints its transcript
#[derive(Debug, Clone)]
pub struct CommandCapture {
    program: String,
}

impl CommandCapture {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SpeechCapture for CommandCapture {
    fn listen(&self) -> Result<String> {
        tracing::debug!(program = %self.program, "listening");

        let output = Command::new(&self.program).output().map_err(|e| {
            Error::SpeechService(format!("failed to run {}: {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::SpeechService(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = normalize_utterance(&String::from_utf8_lossy(&output.stdout));
        if text.is_empty() {
            return Err(Error::SpeechUnclear);
        }
        Ok(text)
    }
}
