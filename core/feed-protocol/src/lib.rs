//! Wire-facing record shapes for the Tally occupancy feeds.
//!
//! This crate is shared by the reactive core and the feed simulator to
//! prevent schema drift. The remote service is the authority on what it
//! stores; decoding here is deliberately lenient (missing fields default,
//! unknown timestamp shapes are carried through raw) because the client
//! never writes these records and must degrade rather than reject.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed key of the singleton occupancy record.
pub const OCCUPANCY_RECORD_KEY: &str = "live";

/// Logical name of the append-only event collection.
pub const EVENT_COLLECTION: &str = "entries";

/// Discrete event kinds carried on the wire in the `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Entry,
    Exit,
}

impl EventKind {
    pub fn as_wire(self) -> &'static str {
        match self {
            EventKind::Entry => "entry",
            EventKind::Exit => "exit",
        }
    }

    /// Maps a wire string to a kind. Anything that is not exactly
    /// `"entry"` is an exit; the producer only ever writes these two.
    pub fn from_wire(value: &str) -> EventKind {
        if value == "entry" {
            EventKind::Entry
        } else {
            EventKind::Exit
        }
    }
}

/// The heterogeneous timestamp forms observed on the wire.
///
/// The service's own timestamp type arrives already converted
/// (`Native`); historical writers stored ISO-like strings, some with
/// slash-separated dates; serialized snapshots carry `{seconds: ..}`
/// objects. Anything else is retained raw so diagnostics can show it.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampValue {
    Native(DateTime<Utc>),
    Text(String),
    EpochSeconds { seconds: i64 },
    Other(Value),
}

impl TimestampValue {
    /// Decodes a raw field value. `None` for JSON null (absent field).
    pub fn from_value(value: &Value) -> Option<TimestampValue> {
        match value {
            Value::Null => None,
            Value::String(text) => Some(TimestampValue::Text(text.clone())),
            Value::Object(map) => match map.get("seconds").and_then(Value::as_i64) {
                Some(seconds) => Some(TimestampValue::EpochSeconds { seconds }),
                None => Some(TimestampValue::Other(value.clone())),
            },
            other => Some(TimestampValue::Other(other.clone())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            TimestampValue::Native(instant) => Value::String(instant.to_rfc3339()),
            TimestampValue::Text(text) => Value::String(text.clone()),
            TimestampValue::EpochSeconds { seconds } => {
                serde_json::json!({ "seconds": seconds })
            }
            TimestampValue::Other(value) => value.clone(),
        }
    }

    /// Convenience constructor for epoch-second payloads.
    pub fn epoch(seconds: i64) -> TimestampValue {
        TimestampValue::EpochSeconds { seconds }
    }

    /// The instant for epoch-second payloads (`seconds * 1000` ms).
    pub fn epoch_instant(seconds: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(seconds, 0).single()
    }
}

/// The singleton occupancy record as read from its fixed key.
///
/// `count` defaults to 0 when absent; negative values are possible on the
/// wire and are clamped by the consumer, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyRecord {
    pub count: i64,
    pub last_updated: Option<TimestampValue>,
}

impl OccupancyRecord {
    pub fn from_value(value: &Value) -> OccupancyRecord {
        let count = value.get("count").and_then(Value::as_i64).unwrap_or(0);
        let last_updated = value.get("last_updated").and_then(TimestampValue::from_value);
        OccupancyRecord { count, last_updated }
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("count".to_string(), Value::from(self.count));
        if let Some(stamp) = &self.last_updated {
            map.insert("last_updated".to_string(), stamp.to_value());
        }
        Value::Object(map)
    }
}

/// One append-only event record.
///
/// `track_id` carries the tracked subject; older writers used the
/// misspelled `trueL_id` field, so both are kept and resolved in order.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub event: String,
    pub timestamp: Option<TimestampValue>,
    pub track_id: Option<i64>,
    pub legacy_track_id: Option<i64>,
}

impl EventRecord {
    pub fn new(id: impl Into<String>, kind: EventKind, timestamp: TimestampValue) -> EventRecord {
        EventRecord {
            id: id.into(),
            event: kind.as_wire().to_string(),
            timestamp: Some(timestamp),
            track_id: None,
            legacy_track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: i64) -> EventRecord {
        self.track_id = Some(track_id);
        self
    }

    /// Decodes a record body. The id is source-assigned and travels
    /// outside the body, mirroring how the service keys documents.
    pub fn from_value(id: impl Into<String>, value: &Value) -> EventRecord {
        EventRecord {
            id: id.into(),
            event: value
                .get("event")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp: value.get("timestamp").and_then(TimestampValue::from_value),
            track_id: value.get("track_id").and_then(Value::as_i64),
            legacy_track_id: value.get("trueL_id").and_then(Value::as_i64),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("event".to_string(), Value::from(self.event.clone()));
        if let Some(stamp) = &self.timestamp {
            map.insert("timestamp".to_string(), stamp.to_value());
        }
        if let Some(track_id) = self.track_id {
            map.insert("track_id".to_string(), Value::from(track_id));
        }
        if let Some(legacy) = self.legacy_track_id {
            map.insert("trueL_id".to_string(), Value::from(legacy));
        }
        Value::Object(map)
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_wire(&self.event)
    }

    /// Resolves the tracked-subject id: `track_id`, then the legacy
    /// alias, then 0.
    pub fn resolved_track_id(&self) -> i64 {
        self.track_id.or(self.legacy_track_id).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        if self.id.trim().is_empty() {
            return Err(FieldError::new("id", "record id is required"));
        }
        if self.event.trim().is_empty() {
            return Err(FieldError::new("event", "event kind is required"));
        }
        Ok(())
    }
}

/// A rejected wire field, named so callers can log it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> FieldError {
        FieldError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Sort order declared by a subscription. The log client only ever asks
/// for newest-first; the variant exists so the contract is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    NewestFirst,
}

/// A server-side query over the event collection: always ordered by
/// timestamp, optionally bounded below, optionally narrowed to one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub order: SortOrder,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub kind: Option<EventKind>,
}

impl QuerySpec {
    pub fn newest_first() -> QuerySpec {
        QuerySpec {
            order: SortOrder::NewestFirst,
            since: None,
            kind: None,
        }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> QuerySpec {
        self.since = Some(since);
        self
    }

    pub fn with_kind(mut self, kind: EventKind) -> QuerySpec {
        self.kind = Some(kind);
        self
    }
}

impl Default for QuerySpec {
    fn default() -> Self {
        QuerySpec::newest_first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_occupancy_record_with_defaults() {
        let record = OccupancyRecord::from_value(&json!({}));
        assert_eq!(record.count, 0);
        assert_eq!(record.last_updated, None);
    }

    #[test]
    fn decodes_occupancy_record_with_string_timestamp() {
        let record = OccupancyRecord::from_value(&json!({
            "count": 18,
            "last_updated": "2025-09-24T10:15:00"
        }));
        assert_eq!(record.count, 18);
        assert_eq!(
            record.last_updated,
            Some(TimestampValue::Text("2025-09-24T10:15:00".to_string()))
        );
    }

    #[test]
    fn decodes_epoch_seconds_object() {
        let stamp = TimestampValue::from_value(&json!({ "seconds": 1700000000 }));
        assert_eq!(stamp, Some(TimestampValue::EpochSeconds { seconds: 1700000000 }));
    }

    #[test]
    fn unknown_timestamp_shape_is_retained_raw() {
        let raw = json!({ "nanos": 5 });
        let stamp = TimestampValue::from_value(&raw);
        assert_eq!(stamp, Some(TimestampValue::Other(raw)));
    }

    #[test]
    fn null_timestamp_is_absent() {
        assert_eq!(TimestampValue::from_value(&Value::Null), None);
    }

    #[test]
    fn event_kind_maps_non_entry_to_exit() {
        assert_eq!(EventKind::from_wire("entry"), EventKind::Entry);
        assert_eq!(EventKind::from_wire("exit"), EventKind::Exit);
        assert_eq!(EventKind::from_wire("departure"), EventKind::Exit);
    }

    #[test]
    fn resolves_track_id_through_legacy_alias() {
        let record = EventRecord::from_value(
            "evt-1",
            &json!({ "event": "entry", "trueL_id": 12 }),
        );
        assert_eq!(record.track_id, None);
        assert_eq!(record.legacy_track_id, Some(12));
        assert_eq!(record.resolved_track_id(), 12);
    }

    #[test]
    fn track_id_wins_over_legacy_alias() {
        let record = EventRecord::from_value(
            "evt-2",
            &json!({ "event": "exit", "track_id": 7, "trueL_id": 12 }),
        );
        assert_eq!(record.resolved_track_id(), 7);
    }

    #[test]
    fn missing_track_fields_default_to_zero() {
        let record = EventRecord::from_value("evt-3", &json!({ "event": "exit" }));
        assert_eq!(record.resolved_track_id(), 0);
    }

    #[test]
    fn validate_rejects_blank_id() {
        let record = EventRecord::from_value("  ", &json!({ "event": "entry" }));
        assert!(record.validate().is_err());
    }

    #[test]
    fn validate_rejects_blank_event() {
        let record = EventRecord::from_value("evt-4", &json!({}));
        assert!(record.validate().is_err());
    }

    #[test]
    fn record_round_trips_through_value() {
        let record = EventRecord::new(
            "evt-5",
            EventKind::Exit,
            TimestampValue::epoch(1700000000),
        )
        .with_track_id(7);
        let decoded = EventRecord::from_value("evt-5", &record.to_value());
        assert_eq!(decoded, record);
    }

    #[test]
    fn query_spec_builder_sets_constraints() {
        let since = Utc.with_ymd_and_hms(2025, 9, 24, 0, 0, 0).unwrap();
        let query = QuerySpec::newest_first()
            .with_since(since)
            .with_kind(EventKind::Entry);
        assert_eq!(query.order, SortOrder::NewestFirst);
        assert_eq!(query.since, Some(since));
        assert_eq!(query.kind, Some(EventKind::Entry));
    }
}
