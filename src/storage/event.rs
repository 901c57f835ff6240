//! Core event type for the Eventide storage layer
//!
//! An [`Event`] is the atomic unit of ingestion: a timestamp, a logical
//! table, an optional user id, an event name, and a free-form string
//! property bag. There is no schema; two events in the same table may carry
//! entirely different properties.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the table events land in when none is given.
pub const DEFAULT_TABLE: &str = "events";

/// A single ingested event
///
/// Size is typically 100-300 bytes depending on the property bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Unix timestamp in milliseconds
    #[serde(default = "now_millis")]
    pub ts: i64,
    /// Logical table this event belongs to
    #[serde(default = "default_table")]
    pub table: String,
    /// Optional user identifier
    #[serde(default)]
    pub user_id: Option<String>,
    /// Event name (must be non-empty for the event to be valid)
    pub event: String,
    /// Free-form string properties
    #[serde(default)]
    pub props: HashMap<String, String>,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

impl Event {
    /// Create an event with the current timestamp and default table
    pub fn new(user_id: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            ts: now_millis(),
            table: default_table(),
            user_id: Some(user_id.into()),
            event: event.into(),
            props: HashMap::new(),
        }
    }

    /// Create an event with an explicit timestamp
    pub fn with_timestamp(
        ts: i64,
        user_id: impl Into<String>,
        event: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            table: default_table(),
            user_id: Some(user_id.into()),
            event: event.into(),
            props: HashMap::new(),
        }
    }

    /// Builder method: set the table
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Builder method: set the timestamp
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.ts = ts;
        self
    }

    /// Builder method: add a property
    pub fn prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Get a property value
    pub fn property(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(String::as_str)
    }

    /// An event is valid when its name is non-empty and non-whitespace
    pub fn is_valid(&self) -> bool {
        !self.event.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = Event::new("u1", "click").prop("region", "us");

        assert_eq!(event.user_id.as_deref(), Some("u1"));
        assert_eq!(event.event, "click");
        assert_eq!(event.table, DEFAULT_TABLE);
        assert_eq!(event.property("region"), Some("us"));
        assert_eq!(event.property("missing"), None);
        assert!(event.ts > 0);
    }

    #[test]
    fn test_event_builder() {
        let event = Event::with_timestamp(1000, "u1", "purchase")
            .table("orders")
            .prop("price", "25");

        assert_eq!(event.ts, 1000);
        assert_eq!(event.table, "orders");
        assert_eq!(event.property("price"), Some("25"));
    }

    #[test]
    fn test_event_validity() {
        assert!(Event::new("u1", "click").is_valid());
        assert!(!Event::new("u1", "").is_valid());
        assert!(!Event::new("u1", "   ").is_valid());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::with_timestamp(1000, "u1", "click").prop("region", "us");
        let json = serde_json::to_string(&event).unwrap();
        let restored: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_deserialization_defaults() {
        // Minimal payload: only the event name is required
        let event: Event = serde_json::from_str(r#"{"event":"click"}"#).unwrap();

        assert_eq!(event.table, DEFAULT_TABLE);
        assert!(event.user_id.is_none());
        assert!(event.props.is_empty());
        assert!(event.ts > 0);
    }
}
