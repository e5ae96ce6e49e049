//! FIFO between the capture loop and the dispatch loop

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::classifier::Command;

/// A queued command
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Insertion order, starting at 0
    pub seq: u64,
    pub id: Uuid,
    pub command: Command,
    pub enqueued_at: DateTime<Utc>,
}

struct Producer {
    tx: mpsc::UnboundedSender<QueueEntry>,
    next_seq: u64,
}

/// Unbounded multi-producer FIFO with a single consumer
///
/// Growth is unbounded if the consumer stalls.
pub struct CommandQueue {
    producer: Mutex<Producer>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueueEntry>>,
    len: AtomicUsize,
}

impl CommandQueue {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            producer: Mutex::new(Producer { tx, next_seq: 0 }),
            rx: tokio::sync::Mutex::new(rx),
            len: AtomicUsize::new(0),
        }
    }

    /// Append a command; returns its sequence number
    pub fn push(&self, command: Command) -> u64 {
        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = producer.next_seq;
        producer.next_seq += 1;

        let entry = QueueEntry {
            seq,
            id: Uuid::new_v4(),
            command,
            enqueued_at: Utc::now(),
        };
        tracing::debug!(seq, id = %entry.id, category = %entry.command.category, "enqueue");

        self.len.fetch_add(1, Ordering::SeqCst);
        // the receiver lives in self, so the channel is never closed here
        if producer.tx.send(entry).is_err() {
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        seq
    }

    /// Oldest entry, waiting at most `wait` for one to arrive
    pub async fn pop_timeout(&self, wait: Duration) -> Option<QueueEntry> {
        let mut rx = self.rx.lock().await;
        let entry = tokio::time::timeout(wait, rx.recv()).await.ok().flatten()?;
        self.len.fetch_sub(1, Ordering::SeqCst);
        Some(entry)
    }

    /// Entries waiting to be dispatched
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
