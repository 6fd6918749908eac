//! Mock event source for testing without input files.

use super::{DataSourceError, EventSource};
use crate::domain::RawEvent;
use async_trait::async_trait;

/// Mock event source that returns predefined events.
#[derive(Debug, Clone, Default)]
pub struct MockEventSource {
    events: Vec<RawEvent>,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, event: RawEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_events(mut self, events: Vec<RawEvent>) -> Self {
        self.events.extend(events);
        self
    }
}

#[async_trait]
impl EventSource for MockEventSource {
    async fn fetch_events(&self) -> Result<Vec<RawEvent>, DataSourceError> {
        Ok(self.events.clone())
    }
}
