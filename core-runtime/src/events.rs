//! # Event Bus System
//!
//! Decoupled notifications between the offline subsystem and its host, built
//! on `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: one enum per domain (connectivity, sync queue, downloads)
//!   wrapped by [`CoreEvent`]
//! - **EventBus**: broadcast channel shared by every component
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐   subscribe   ┌────────────┐
//! │ Connectivity ├────────────>│           ├──────────────>│  Host UI   │
//! ├──────────────┤    emit     │ EventBus  │               └────────────┘
//! │  Sync Queue  ├────────────>│           │   subscribe   ┌────────────┐
//! ├──────────────┤    emit     │           ├──────────────>│ Diagnostics│
//! │  Downloader  ├────────────>│           │               └────────────┘
//! └──────────────┘             └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ConnectivityEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(CoreEvent::Connectivity(ConnectivityEvent::Online)).ok();
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Connectivity(ConnectivityEvent::Online));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; keep reading.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.
//!
//! Emitting with no subscribers returns `Err(SendError)`. Components call
//! `.ok()` on it: nobody listening is a normal state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Online/offline transitions
    Connectivity(ConnectivityEvent),
    /// Sync queue activity
    Sync(SyncEvent),
    /// Course snapshot downloads
    Download(DownloadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Connectivity(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::ActionDropped { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::MediaFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Connectivity(ConnectivityEvent::Offline) => EventSeverity::Warning,
            CoreEvent::Connectivity(ConnectivityEvent::Online) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::DrainCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Connectivity Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConnectivityEvent {
    /// Tracked state went offline
    Offline,
    /// Tracked state came back online
    Online,
}

impl ConnectivityEvent {
    fn description(&self) -> &str {
        match self {
            ConnectivityEvent::Offline => "Connectivity lost",
            ConnectivityEvent::Online => "Connectivity restored",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to the pending-action queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// An action was persisted to the queue.
    ActionQueued {
        action_id: String,
        kind: String,
        queue_len: usize,
    },
    /// A drain pass started.
    DrainStarted {
        /// Number of actions attempted in this pass.
        pending: usize,
    },
    /// A drain pass finished.
    DrainCompleted {
        succeeded: usize,
        failed: usize,
        dropped: usize,
        remaining: usize,
    },
    /// An action was removed after reaching the retry ceiling.
    ActionDropped {
        action_id: String,
        kind: String,
        max_retries: u32,
    },
    /// Actions older than the retention window were discarded.
    ActionsExpired { count: usize },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::ActionQueued { .. } => "Action queued for sync",
            SyncEvent::DrainStarted { .. } => "Sync drain started",
            SyncEvent::DrainCompleted { .. } => "Sync drain completed",
            SyncEvent::ActionDropped { .. } => "Action dropped after max retries",
            SyncEvent::ActionsExpired { .. } => "Expired actions removed",
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

/// Events related to course snapshot capture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// Download of a course started.
    Started { course_type: String },
    /// The content tree was fetched; media capture begins.
    ContentFetched {
        course_type: String,
        course_id: String,
        media_total: usize,
    },
    /// Progress through the media list.
    Progress {
        course_type: String,
        completed: usize,
        total: usize,
    },
    /// A non-critical media item could not be captured.
    MediaFailed {
        course_type: String,
        url: String,
        reason: String,
    },
    /// Snapshot written.
    Completed {
        course_type: String,
        course_id: String,
        media_stored: usize,
        media_failed: usize,
    },
    /// Fatal failure; nothing was written.
    Failed { course_type: String, reason: String },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Started { .. } => "Course download started",
            DownloadEvent::ContentFetched { .. } => "Course content fetched",
            DownloadEvent::Progress { .. } => "Course download in progress",
            DownloadEvent::MediaFailed { .. } => "Media item could not be captured",
            DownloadEvent::Completed { .. } => "Course download completed",
            DownloadEvent::Failed { .. } => "Course download failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let downloads = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Download(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive; `None` when nothing matching is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
