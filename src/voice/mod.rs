//! Voice input and output
//!
//! Capture turns one utterance into text (blocking, run on a blocking
//! thread by the pipeline). The sink renders spoken feedback; every
//! utterance runs in its own task behind a single lock so two renders
//! never overlap.

mod capture;
mod sink;

pub use capture::{CommandCapture, ConsoleCapture, SpeechCapture, normalize_utterance};
pub use sink::{CommandRenderer, LogRenderer, SpeechRenderer, SpeechSink};
