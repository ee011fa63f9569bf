//! # Event Bus System
//!
//! Typed pub/sub built on `tokio::sync::broadcast`, connecting the file sync
//! core to the hosting record-sync engine and to application subscribers.
//!
//! ## Overview
//!
//! Two event families flow through the bus:
//!
//! - **Store events** ([`StoreOperationCompleted`]): published by the
//!   record-sync engine whenever a record-level local-store operation
//!   finishes. The file sync context subscribes to these to trigger pulls
//!   for changed records and metadata purges for deleted ones.
//! - **File events** ([`FileOperationCompleted`]): published by the file
//!   sync context after local mutations and pull-driven changes.
//!
//! Publication is best-effort telemetry: `emit` never blocks, delivery is
//! not transactional with the state change that produced the event, and a
//! publisher does not care whether anyone is listening.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream =
//!     EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::File(_)));
//! # }
//! ```
//!
//! Subscribers that fall behind receive `RecvError::Lagged(n)` and can keep
//! reading; `RecvError::Closed` signals that every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Types
// ============================================================================

/// Top-level event enum published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// A record-level local-store operation completed.
    Store(StoreOperationCompleted),
    /// A file operation completed.
    File(FileOperationCompleted),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Store(e) => e.description(),
            CoreEvent::File(e) => e.description(),
        }
    }
}

/// Where an operation originated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationSource {
    /// A local mutation made by the application.
    Local,
    /// Applied while pulling server changes into local state.
    ServerPull,
    /// Applied while pushing local changes to the server.
    ServerPush,
}

impl OperationSource {
    /// True for operations that originated on the server side.
    pub fn is_server(&self) -> bool {
        matches!(self, OperationSource::ServerPull | OperationSource::ServerPush)
    }
}

/// The kind of record-level store operation that completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreOperationKind {
    Insert,
    Update,
    Upsert,
    Delete,
}

/// Published by the record-sync engine when a local-store operation finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreOperationCompleted {
    /// Table of the affected record.
    pub table_name: String,
    /// Identifier of the affected record.
    pub record_id: String,
    /// What happened to the record.
    pub kind: StoreOperationKind,
    /// Where the operation originated.
    pub source: OperationSource,
}

impl StoreOperationCompleted {
    fn description(&self) -> &str {
        match self.kind {
            StoreOperationKind::Insert => "Record inserted",
            StoreOperationKind::Update => "Record updated",
            StoreOperationKind::Upsert => "Record upserted",
            StoreOperationKind::Delete => "Record deleted",
        }
    }
}

/// The kind of file change a completion event reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    Create,
    Update,
    Delete,
}

/// Published by the file sync context after a file operation completes.
///
/// Payloads carry ids and names rather than full metadata so events stay
/// cheap to clone per subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileOperationCompleted {
    /// Identity of the affected file.
    pub file_id: String,
    /// Display name of the affected file.
    pub file_name: String,
    /// Table of the parent record the file is attached to.
    pub table_name: String,
    /// Identifier of the parent record.
    pub record_id: String,
    /// What happened to the file.
    pub kind: FileChangeKind,
    /// Where the change originated.
    pub source: OperationSource,
}

impl FileOperationCompleted {
    fn description(&self) -> &str {
        match self.kind {
            FileChangeKind::Create => "File created",
            FileChangeKind::Update => "File updated",
            FileChangeKind::Delete => "File deleted",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to [`CoreEvent`]s.
///
/// Uses `tokio::sync::broadcast` internally: clone the bus for more
/// producers, call [`subscribe`](EventBus::subscribe) for independent
/// consumers. Slow consumers lag rather than blocking fast ones.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per
    /// subscriber before lagging kicks in.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received the event. An `Err`
    /// only means nobody was listening; publishers treating events as
    /// best-effort telemetry can ignore it.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber receiving all future events.
    ///
    /// Past events are not replayed. Dropping the receiver releases the
    /// subscription.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
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

/// A `broadcast::Receiver` wrapper with predicate filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let stream =
///     EventStream::new(bus.subscribe()).filter(|event| matches!(event, CoreEvent::Store(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter; only matching events are returned by `recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event passing the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
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

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store_event(kind: StoreOperationKind, source: OperationSource) -> CoreEvent {
        CoreEvent::Store(StoreOperationCompleted {
            table_name: "Notes".to_string(),
            record_id: "42".to_string(),
            kind,
            source,
        })
    }

    fn file_event(kind: FileChangeKind) -> CoreEvent {
        CoreEvent::File(FileOperationCompleted {
            file_id: "f1".to_string(),
            file_name: "photo.jpg".to_string(),
            table_name: "Notes".to_string(),
            record_id: "42".to_string(),
            kind,
            source: OperationSource::Local,
        })
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_err_not_panic() {
        let bus = EventBus::new(10);
        assert!(bus.emit(file_event(FileChangeKind::Create)).is_err());
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = store_event(StoreOperationKind::Insert, OperationSource::ServerPull);
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_stream_filter_skips_non_matching() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Store(_)));

        bus.emit(file_event(FileChangeKind::Update)).ok();
        let wanted = store_event(StoreOperationKind::Delete, OperationSource::ServerPush);
        bus.emit(wanted.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), wanted);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.emit(file_event(FileChangeKind::Update)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_operation_source_is_server() {
        assert!(OperationSource::ServerPull.is_server());
        assert!(OperationSource::ServerPush.is_server());
        assert!(!OperationSource::Local.is_server());
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = store_event(StoreOperationKind::Upsert, OperationSource::ServerPull);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Notes"));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_description() {
        assert_eq!(
            file_event(FileChangeKind::Delete).description(),
            "File deleted"
        );
        assert_eq!(
            store_event(StoreOperationKind::Insert, OperationSource::Local).description(),
            "Record inserted"
        );
    }
}
