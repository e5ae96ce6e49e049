//! Capture and dispatch loops

use std::sync::Arc;

use tokio::sync::watch;

use super::dispatcher::INTERNAL_ERROR_MESSAGE;
use super::{CommandQueue, Dispatcher, QueueEntry, Status, StatusMarker};
use crate::classifier::{Category, Classifier, is_exit_phrase};
use crate::config::PipelineConfig;
use crate::device::{ActionResult, NO_DEVICE_MESSAGE};
use crate::voice::SpeechCapture;
use crate::{Error, Result};

const READY_MESSAGE: &str = "Android AI Agent is now active and listening for commands.";
const UNCLEAR_MESSAGE: &str = "Sorry, I didn't catch that. Could you repeat?";

/// What the capture loop did with an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Answered immediately without queueing
    Answered(ActionResult),
    /// Exit requested
    Exit,
    /// Queued with this sequence number
    Queued(u64),
}

/// The voice agent: one capture loop feeding one dispatch loop
pub struct Agent {
    classifier: Classifier,
    dispatcher: Dispatcher,
    queue: Arc<CommandQueue>,
    capture: Arc<dyn SpeechCapture>,
    status: StatusMarker,
    timing: PipelineConfig,
}

impl Agent {
    pub fn new(
        classifier: Classifier,
        dispatcher: Dispatcher,
        capture: Arc<dyn SpeechCapture>,
        status: StatusMarker,
        timing: PipelineConfig,
    ) -> Self {
        Self {
            classifier,
            dispatcher,
            queue: Arc::new(CommandQueue::new()),
            capture,
            status,
            timing,
        }
    }

    /// Share an existing queue (e.g. with the HTTP API)
    #[must_use]
    pub fn with_queue(mut self, queue: Arc<CommandQueue>) -> Self {
        self.queue = queue;
        self
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Classify one utterance, then answer, exit or enqueue it
    pub async fn handle_utterance(&self, text: &str) -> Routed {
        tracing::info!(text, "heard");

        if is_exit_phrase(text) {
            self.dispatcher.shutdown().await;
            return Routed::Exit;
        }

        self.status.set(Status::Thinking);
        let command = self.classifier.classify(text).await;
        tracing::debug!(category = %command.category, query = %command.query, "classified");

        match command.category {
            Category::Realtime => {
                self.status.set(Status::Answering);
                let result = self.dispatcher.answer(&command.query).await;
                self.status.set(Status::Available);
                Routed::Answered(result)
            }
            Category::Exit => {
                self.dispatcher.shutdown().await;
                Routed::Exit
            }
            _ => Routed::Queued(self.queue.push(command)),
        }
    }

    /// Listen, classify and route until shutdown, exit or closed input
    pub async fn capture_loop(&self, shutdown: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.status.set(Status::Listening);

            let capture = Arc::clone(&self.capture);
            let listen = tokio::task::spawn_blocking(move || capture.listen());

            let heard = tokio::select! {
                Ok(()) = shutdown.changed() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                heard = listen => heard,
            };

            match heard {
                Ok(Ok(text)) => {
                    if self.handle_utterance(&text).await == Routed::Exit {
                        break;
                    }
                }
                Ok(Err(Error::SpeechUnclear)) => {
                    self.dispatcher.speech().speak(UNCLEAR_MESSAGE);
                }
                Ok(Err(Error::InputClosed)) => {
                    tracing::info!("speech input closed");
                    break;
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "speech capture failed");
                    tokio::time::sleep(self.timing.error_backoff).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "capture task failed");
                    tokio::time::sleep(self.timing.error_backoff).await;
                }
            }
        }
    }

    /// Run the agent until Ctrl-C, an exit command or closed input
    ///
    /// # Errors
    ///
    /// Returns error if no device is connected at startup
    pub async fn run(&self) -> Result<()> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(true);
            }
        });
        self.run_until(rx).await
    }

    /// Run the agent until `shutdown` flips to true
    ///
    /// Commands already queued when the input closes are still dispatched;
    /// on shutdown the dispatch loop stops after the command in flight.
    ///
    /// # Errors
    ///
    /// Returns error if no device is connected at startup
    pub async fn run_until(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let session = self.dispatcher.actuator().session().await;
        if !session.connected {
            self.dispatcher.speech().speak(NO_DEVICE_MESSAGE);
            self.dispatcher.speech().wait_idle().await;
            return Err(Error::DeviceUnavailable);
        }
        tracing::info!(devices = session.device_count, "device connected");

        self.dispatcher.speech().speak(READY_MESSAGE);
        self.status.set(Status::Available);

        let (drain_tx, drain_rx) = watch::channel(false);
        let dispatch = tokio::spawn(dispatch_loop(
            self.dispatcher.clone(),
            Arc::clone(&self.queue),
            self.status.clone(),
            self.timing.clone(),
            shutdown.clone(),
            drain_rx,
        ));

        self.capture_loop(&mut shutdown).await;

        let _ = drain_tx.send(true);
        if let Err(e) = dispatch.await {
            tracing::error!(error = %e, "dispatch loop failed");
        }

        self.dispatcher.speech().wait_idle().await;
        tracing::info!("agent stopped");
        Ok(())
    }
}

/// Pop and execute commands one at a time
///
/// Stops on `shutdown`, or once `drain` is set and the queue is empty.
pub async fn dispatch_loop(
    dispatcher: Dispatcher,
    queue: Arc<CommandQueue>,
    status: StatusMarker,
    timing: PipelineConfig,
    shutdown: watch::Receiver<bool>,
    drain: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let Some(entry) = queue.pop_timeout(timing.poll_interval).await else {
            if *drain.borrow() {
                break;
            }
            continue;
        };

        let QueueEntry { seq, id, command, .. } = entry;
        tracing::debug!(seq, %id, category = %command.category, "dequeued");
        status.set(Status::Executing);

        let worker = dispatcher.clone();
        let handle = tokio::spawn(async move { worker.execute(&command).await });
        match handle.await {
            Ok(Some(result)) => {
                tracing::info!(seq, success = result.success, message = %result.message, "command finished");
            }
            Ok(None) => tracing::info!(seq, "command produced no result"),
            Err(e) => {
                tracing::error!(seq, error = %e, "command handler panicked");
                dispatcher.speech().speak(INTERNAL_ERROR_MESSAGE);
                tokio::time::sleep(timing.error_backoff).await;
            }
        }

        status.set(Status::Available);
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("queue", &self.queue)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
