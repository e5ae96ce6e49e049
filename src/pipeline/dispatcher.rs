//! Routes classified commands to their handlers

use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{Category, Command};
use crate::device::{ActionResult, Actuator, VolumeDirection};
use crate::services::AnswerService;
use crate::voice::SpeechSink;

/// Spoken when handling a command fails unexpectedly
pub const INTERNAL_ERROR_MESSAGE: &str = "An error occurred while processing the command.";

/// Spoken before the process exits
pub const FAREWELL_MESSAGE: &str = "Shutting down.";

const ANSWER_ERROR_MESSAGE: &str = "Sorry, I couldn't process your request.";

/// Longest wait for the farewell to finish before exiting
const FAREWELL_TIMEOUT: Duration = Duration::from_secs(3);

/// Invoked to terminate the process on an exit command
pub type ExitHook = Arc<dyn Fn() + Send + Sync>;

/// System actions recognized inside a `system` query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    Volume(VolumeDirection),
    Home,
    Back,
    Screenshot,
}

impl SystemAction {
    /// First matching action by substring, checked in a fixed order
    #[must_use]
    pub fn parse(query: &str) -> Option<Self> {
        let query = query.to_lowercase();
        if query.contains("volume up") {
            Some(Self::Volume(VolumeDirection::Up))
        } else if query.contains("volume down") {
            Some(Self::Volume(VolumeDirection::Down))
        } else if query.contains("home") {
            Some(Self::Home)
        } else if query.contains("back") {
            Some(Self::Back)
        } else if ["screenshot", "take a screen", "capture screen"]
            .iter()
            .any(|p| query.contains(p))
        {
            Some(Self::Screenshot)
        } else {
            None
        }
    }
}

/// Executes one command at a time
///
/// Returns `None` when nothing was attempted (no device, exit); otherwise
/// the [`ActionResult`] that was also spoken.
#[derive(Clone)]
pub struct Dispatcher {
    actuator: Arc<Actuator>,
    answers: Arc<dyn AnswerService>,
    speech: SpeechSink,
    exit: ExitHook,
}

impl Dispatcher {
    pub fn new(actuator: Arc<Actuator>, answers: Arc<dyn AnswerService>, speech: SpeechSink) -> Self {
        Self {
            actuator,
            answers,
            speech,
            exit: Arc::new(|| std::process::exit(0)),
        }
    }

    /// Replace the process exit performed on an exit command
    #[must_use]
    pub fn with_exit_hook(mut self, exit: ExitHook) -> Self {
        self.exit = exit;
        self
    }

    #[must_use]
    pub fn actuator(&self) -> &Arc<Actuator> {
        &self.actuator
    }

    #[must_use]
    pub fn speech(&self) -> &SpeechSink {
        &self.speech
    }

    /// Run the handler for `command`
    ///
    /// Every category except exit passes the connectivity gate first.
    pub async fn execute(&self, command: &Command) -> Option<ActionResult> {
        tracing::info!(category = %command.category, query = %command.query, "dispatching");
        let query = command.query.as_str();

        if command.category == Category::Exit {
            self.shutdown().await;
            return None;
        }
        let device = self.actuator.connected().await?;

        let result = match command.category {
            Category::General
            | Category::Realtime
            | Category::GoogleSearch
            | Category::YoutubeSearch => self.answer(query).await,
            Category::Open => device.open_app(query).await,
            Category::Close => self.unsupported(format!("Closing {query} is not supported yet.")),
            Category::Play => self.unsupported(format!("Playing {query} is not supported yet.")),
            Category::System => match SystemAction::parse(query) {
                Some(SystemAction::Volume(direction)) => device.volume(direction).await,
                Some(SystemAction::Home) => device.home().await,
                Some(SystemAction::Back) => device.back().await,
                Some(SystemAction::Screenshot) => device.screenshot().await,
                None => self.unsupported(format!("System command {query} is not supported yet.")),
            },
            Category::Content => self.unsupported(format!(
                "Content generation for {query} is not supported yet."
            )),
            Category::Exit => return None,
        };
        Some(result)
    }

    /// Ask the answer service and speak its reply
    pub async fn answer(&self, query: &str) -> ActionResult {
        match self.answers.answer(query).await {
            Ok(answer) => {
                self.speech.speak(&answer);
                ActionResult::success(answer)
            }
            Err(e) => {
                tracing::error!(query, error = %e, "answer service failed");
                self.speech.speak(ANSWER_ERROR_MESSAGE);
                ActionResult::failure(ANSWER_ERROR_MESSAGE)
            }
        }
    }

    /// Speak the farewell and terminate
    ///
    /// Pending work in the queue is abandoned.
    pub async fn shutdown(&self) {
        tracing::info!("exit requested");
        let farewell = self.speech.speak(FAREWELL_MESSAGE);
        if tokio::time::timeout(FAREWELL_TIMEOUT, farewell).await.is_err() {
            tracing::warn!("farewell did not finish in time");
        }
        (self.exit)();
    }

    fn unsupported(&self, message: String) -> ActionResult {
        self.speech.speak(&message);
        ActionResult::failure(message)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("actuator", &self.actuator)
            .finish_non_exhaustive()
    }
}
