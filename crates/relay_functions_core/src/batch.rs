//! Size-bounded event batches in the Event Hubs REST batch shape.
//!
//! A batch serializes to a JSON array of `{"Body": "..."}` entries. Its size
//! is the exact length of that serialized array, so the limit checked on
//! insert is the limit the service sees on send.

use serde::Serialize;

pub const DEFAULT_MAX_BATCH_BYTES: usize = 1_046_528;
pub const BATCH_CONTENT_TYPE: &str = "application/vnd.microsoft.servicebus.json";

const EMPTY_BATCH_BYTES: usize = 2;

/// Event payload. The JSON batch body carries text, so bodies are UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventData {
    body: String,
}

impl EventData {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    fn wire_entry(&self) -> String {
        let entry = WireEvent { body: &self.body };
        serde_json::to_string(&entry).unwrap_or_default()
    }
}

impl From<String> for EventData {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[derive(Serialize)]
struct WireEvent<'a> {
    #[serde(rename = "Body")]
    body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBatch {
    max_size_bytes: usize,
    size_bytes: usize,
    entries: Vec<String>,
    events: Vec<EventData>,
}

impl EventBatch {
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            max_size_bytes,
            size_bytes: EMPTY_BATCH_BYTES,
            entries: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Adds the event if the serialized batch stays within the limit.
    ///
    /// Returns `false` and leaves the batch untouched otherwise.
    pub fn try_add(&mut self, event: EventData) -> bool {
        let entry = event.wire_entry();
        let separator = usize::from(!self.entries.is_empty());
        let projected = self.size_bytes + separator + entry.len();
        if projected > self.max_size_bytes {
            return false;
        }

        self.size_bytes = projected;
        self.entries.push(entry);
        self.events.push(event);
        true
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn events(&self) -> &[EventData] {
        &self.events
    }

    pub fn to_wire_body(&self) -> Vec<u8> {
        format!("[{}]", self.entries.join(",")).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_batch_serializes_to_empty_array() {
        let batch = EventBatch::new(DEFAULT_MAX_BATCH_BYTES);
        assert!(batch.is_empty());
        assert_eq!(batch.to_wire_body(), b"[]");
        assert_eq!(batch.size_in_bytes(), 2);
    }

    #[test]
    fn size_matches_serialized_body() {
        let mut batch = EventBatch::new(DEFAULT_MAX_BATCH_BYTES);
        assert!(batch.try_add(EventData::from("a,b,\"c\"".to_string())));
        assert!(batch.try_add(EventData::from("second".to_string())));

        let body = batch.to_wire_body();
        assert_eq!(batch.size_in_bytes(), body.len());

        let parsed: serde_json::Value =
            serde_json::from_slice(&body).expect("batch body should be valid json");
        assert_eq!(parsed[0]["Body"], "a,b,\"c\"");
        assert_eq!(parsed[1]["Body"], "second");
    }

    #[test]
    fn rejects_event_that_exceeds_limit_without_mutating() {
        // `[{"Body":"abc"}]` is 16 bytes.
        let mut batch = EventBatch::new(16);
        assert!(batch.try_add(EventData::from("abc".to_string())));
        assert_eq!(batch.size_in_bytes(), 16);

        assert!(!batch.try_add(EventData::from("d".to_string())));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.size_in_bytes(), 16);
    }

    #[test]
    fn single_oversized_event_never_fits() {
        let mut batch = EventBatch::new(64);
        assert!(!batch.try_add(EventData::new("x".repeat(64))));
        assert!(batch.is_empty());
    }

    #[test]
    fn non_ascii_bodies_reach_the_wire_unchanged() {
        let body = "Zoë,Ünïcode ✓,日本";
        let mut batch = EventBatch::new(DEFAULT_MAX_BATCH_BYTES);
        assert!(batch.try_add(EventData::new(body)));
        assert_eq!(batch.events()[0].body(), body);

        let wire = batch.to_wire_body();
        assert_eq!(batch.size_in_bytes(), wire.len());
        let parsed: serde_json::Value =
            serde_json::from_slice(&wire).expect("batch body should be valid json");
        assert_eq!(parsed[0]["Body"], body);
    }
}
