//! Event sink trait and implementations.

use super::{Notification, NotificationKind};
use async_trait::async_trait;
use tracing::{debug, info, Level};

/// Receives stage notifications.
///
/// Emission never fails from the stage's point of view; sinks log and
/// swallow their own errors.
#[async_trait]
pub trait EventSink: Send + Sync + std::fmt::Debug {
    /// Emits a notification.
    async fn emit(&self, notification: Notification);

    /// Emits a notification without awaiting.
    fn try_emit(&self, notification: Notification);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _notification: Notification) {}

    fn try_emit(&self, _notification: Notification) {}
}

/// A sink that logs notifications through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log(&self, n: &Notification) {
        if self.level == Level::DEBUG {
            debug!(event_type = %n.kind, stage = %n.stage, data = ?n.data, "Notification");
        } else {
            info!(event_type = %n.kind, stage = %n.stage, data = ?n.data, "Notification");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, notification: Notification) {
        self.log(&notification);
    }

    fn try_emit(&self, notification: Notification) {
        self.log(&notification);
    }
}

/// A sink that keeps every notification, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<Notification>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every notification.
    #[must_use]
    pub fn events(&self) -> Vec<Notification> {
        self.events.read().clone()
    }

    /// Returns notifications of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.events
            .read()
            .iter()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops every notification.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, notification: Notification) {
        self.events.write().push(notification);
    }

    fn try_emit(&self, notification: Notification) {
        self.events.write().push(notification);
    }
}
