//! Per-invocation stage context.

use crate::core::PipelineEvent;
use crate::events::{EventSink, NoOpEventSink, Notification, NotificationKind};
use crate::utils::{generate_execution_id, Clock, Timestamp};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use uuid::Uuid;

/// Date format of dated artifact folders.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Everything a stage invocation needs besides its own configuration.
///
/// The clock is read once when the context is built, so every time-derived
/// value in one invocation (poll windows, freshness, dated folders) agrees.
#[derive(Debug, Clone)]
pub struct StageContext {
    execution_id: Uuid,
    stage_name: String,
    input: PipelineEvent,
    now: Timestamp,
    events: Arc<dyn EventSink>,
}

impl StageContext {
    /// Creates a context with a fresh execution id and no event sink.
    #[must_use]
    pub fn new(stage_name: impl Into<String>, input: PipelineEvent, clock: &dyn Clock) -> Self {
        Self {
            execution_id: generate_execution_id(),
            stage_name: stage_name.into(),
            input,
            now: clock.now(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the execution id.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: Uuid) -> Self {
        self.execution_id = execution_id;
        self
    }

    /// Returns the execution id.
    #[must_use]
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the decoded input event.
    #[must_use]
    pub fn input(&self) -> &PipelineEvent {
        &self.input
    }

    /// Returns the invocation time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Returns today's UTC date.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    /// Returns yesterday's UTC date.
    #[must_use]
    pub fn yesterday(&self) -> NaiveDate {
        (self.now - Duration::days(1)).date_naive()
    }

    /// Formats a date for dated folders.
    #[must_use]
    pub fn folder_date(date: NaiveDate) -> String {
        date.format(DATE_FORMAT).to_string()
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Emits a notification from this stage.
    pub async fn notify(&self, kind: NotificationKind, data: serde_json::Value) {
        self.events
            .emit(Notification::new(kind, self.stage_name.clone()).with_data(data))
            .await;
    }
}
