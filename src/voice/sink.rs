//! Spoken feedback

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Renders one utterance; returns once playback has finished
#[async_trait]
pub trait SpeechRenderer: Send + Sync {
    async fn render(&self, text: &str) -> Result<()>;
}

/// Renders through an external TTS program (`espeak`, `say`, ...)
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
}

impl CommandRenderer {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SpeechRenderer for CommandRenderer {
    async fn render(&self, text: &str) -> Result<()> {
        let status = tokio::process::Command::new(&self.program)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Tts(format!("failed to run {}: {e}", self.program)))?;

        if !status.success() {
            return Err(Error::Tts(format!("{} exited with {status}", self.program)));
        }
        Ok(())
    }
}

/// Writes utterances to the log instead of a speaker
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRenderer;

#[async_trait]
impl SpeechRenderer for LogRenderer {
    async fn render(&self, text: &str) -> Result<()> {
        tracing::info!(text, "speak");
        Ok(())
    }
}

/// Fire-and-forget speech output
///
/// Renders are serialized by one lock, but the order in which concurrently
/// fired utterances acquire it is whatever the scheduler picks.
#[derive(Clone)]
pub struct SpeechSink {
    renderer: Arc<dyn SpeechRenderer>,
    lock: Arc<Mutex<()>>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl SpeechSink {
    pub fn new(renderer: Arc<dyn SpeechRenderer>) -> Self {
        Self {
            renderer,
            lock: Arc::new(Mutex::new(())),
            pending: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    /// Sink that only logs
    #[must_use]
    pub fn muted() -> Self {
        Self::new(Arc::new(LogRenderer))
    }

    /// Queue an utterance without waiting for it
    ///
    /// Render failures are logged, never surfaced. Await the returned handle
    /// to wait for this utterance only.
    pub fn speak(&self, text: &str) -> JoinHandle<()> {
        tracing::debug!(text, "queue utterance");
        self.pending.fetch_add(1, Ordering::SeqCst);

        let text = text.to_string();
        let renderer = Arc::clone(&self.renderer);
        let lock = Arc::clone(&self.lock);
        let pending = Arc::clone(&self.pending);
        let idle = Arc::clone(&self.idle);

        tokio::spawn(async move {
            {
                let _guard = lock.lock().await;
                if let Err(e) = renderer.render(&text).await {
                    tracing::warn!(error = %e, "speech render failed");
                }
            }
            if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle.notify_waiters();
            }
        })
    }

    /// Utterances queued or rendering
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every queued utterance has been rendered
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for SpeechSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSink")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
