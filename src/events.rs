//! Run events and cooperative cancellation.
//!
//! The worker reports through an [`EventSender`]; whoever drives the UI
//! owns the receiving end. Every event is mirrored to `tracing`.

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};

/// Something the worker wants the consumer to know.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Human-readable progress line.
    Log { at: DateTime<Local>, message: String },
    /// `current` of `total` chapters of the current book are done.
    Progress { current: usize, total: usize },
    /// A book was assembled and written.
    Done { output: PathBuf },
    /// The run stopped on an error.
    Error { detail: String },
    /// Always the last event of a run.
    RunFinished,
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<RunEvent>,
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (EventSender, UnboundedReceiver<RunEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

impl EventSender {
    fn send(&self, event: RunEvent) {
        // A dropped receiver only means nobody is watching any more.
        let _ = self.tx.send(event);
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.send(RunEvent::Log {
            at: Local::now(),
            message,
        });
    }

    pub fn progress(&self, current: usize, total: usize) {
        self.send(RunEvent::Progress { current, total });
    }

    pub fn done(&self, output: PathBuf) {
        info!(output = %output.display(), "Book written");
        self.send(RunEvent::Done { output });
    }

    pub fn error(&self, detail: impl Into<String>) {
        let detail = detail.into();
        error!("{}", detail);
        self.send(RunEvent::Error { detail });
    }

    pub fn finished(&self) {
        self.send(RunEvent::RunFinished);
    }
}

/// Shared cancellation flag, polled at well-defined points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, checking the flag once per second.
    ///
    /// Returns `false` if cancellation cut the wait short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let tick = Duration::from_secs(1);
        let mut remaining = duration;

        while !remaining.is_zero() {
            if self.is_cancelled() {
                return false;
            }
            let step = remaining.min(tick);
            tokio::time::sleep(step).await;
            remaining -= step;
        }

        !self.is_cancelled()
    }
}
