//! Handset - voice-driven automation agent for Android devices
//!
//! This library provides the command pipeline behind the `handset` binary:
//! - Speech capture and serialized speech output
//! - Intent classification through a hosted language model
//! - A FIFO command queue between the capture and dispatch loops
//! - Device actuation over `adb` (app launch, key events, scripted flows)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────────┐
//! │ capture loop │──▶│ classifier │──▶│ command queue│
//! └──────┬───────┘   └────────────┘   └──────┬───────┘
//!        │ realtime / exit                   │
//!        ▼                                   ▼
//! ┌──────────────┐                   ┌──────────────┐   ┌──────────┐
//! │answer service│◀──────────────────│  dispatcher  │──▶│ actuator │──▶ adb
//! └──────┬───────┘                   └──────┬───────┘   └──────────┘
//!        └──────────────┬───────────────────┘
//!                       ▼
//!                 ┌───────────┐
//!                 │speech sink│
//!                 └───────────┘
//! ```

pub mod api;
pub mod classifier;
pub mod config;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod voice;

pub use classifier::{Category, Classifier, ClassifierService, Command};
pub use config::Config;
pub use device::{
    ActionResult, Actuator, AdbController, AppRegistry, DeviceController, DeviceEntry,
    DeviceSession, KeyCode, LaunchStrategy,
};
pub use error::{Error, Result};
pub use pipeline::{Agent, CommandQueue, Dispatcher, QueueEntry, Routed, StatusMarker};
pub use services::{AnswerService, ChatClient};
pub use voice::{SpeechCapture, SpeechRenderer, SpeechSink};
