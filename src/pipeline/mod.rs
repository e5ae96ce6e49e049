//! Command pipeline
//!
//! The capture loop classifies utterances and pushes them onto the
//! [`CommandQueue`]; the dispatch loop pops one command at a time and runs
//! it through the [`Dispatcher`] to completion before taking the next.

mod agent;
mod dispatcher;
mod queue;
mod status;

pub use agent::{Agent, Routed, dispatch_loop};
pub use dispatcher::{
    Dispatcher, ExitHook, FAREWELL_MESSAGE, INTERNAL_ERROR_MESSAGE, SystemAction,
};
pub use queue::{CommandQueue, QueueEntry};
pub use status::{Status, StatusMarker};
