// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::SystemTime;

/// Severity attached to an event. Carried through the pipeline untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Level {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Random 128-bit event identifier, rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u128);

impl EventId {
    #[must_use]
    pub fn new() -> Self {
        Self(fastrand::u128(..))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A single telemetry event.
///
/// Events are immutable once built: the queue owns them until they are drained, then they are
/// moved into a [`crate::Batch`] and destroyed after delivery or a definitive drop.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    timestamp: SystemTime,
    level: Level,
    payload: Vec<u8>,
    size_hint: usize,
}

impl Event {
    /// Builds an event from an opaque payload. The size hint defaults to the payload length.
    pub fn new(level: Level, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        Self {
            id: EventId::new(),
            timestamp: SystemTime::now(),
            level,
            size_hint: payload.len(),
            payload,
        }
    }

    /// Builds an event whose payload is the JSON encoding of `value`.
    pub fn from_json<T: Serialize + ?Sized>(
        level: Level,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(level, serde_json::to_vec(value)?))
    }

    /// Overrides the approximate size used for batch size accounting.
    #[must_use]
    pub fn with_size_hint(mut self, size_hint: usize) -> Self {
        self.size_hint = size_hint;
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn id(&self) -> EventId {
        self.id
    }

    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    #[must_use]
    pub fn level(&self) -> Level {
        self.level
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn size_hint(&self) -> usize {
        self.size_hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_size_hint_defaults_to_payload_length() {
        let event = Event::new(Level::Info, "hello");
        assert_eq!(event.size_hint(), 5);
        assert_eq!(event.payload(), b"hello");

        let event = event.with_size_hint(1_024);
        assert_eq!(event.size_hint(), 1_024);
        assert_eq!(event.payload(), b"hello");
    }

    #[test]
    fn test_from_json() {
        #[derive(Serialize)]
        struct Breadcrumb<'a> {
            message: &'a str,
            count: u32,
        }

        let event = Event::from_json(
            Level::Warning,
            &Breadcrumb {
                message: "disk almost full",
                count: 3,
            },
        )
        .expect("failed to build event");

        assert_eq!(event.level(), Level::Warning);
        assert_eq!(
            event.payload(),
            br#"{"message":"disk almost full","count":3}"#
        );
    }

    #[test]
    fn test_event_id_format() {
        let id = EventId::new();
        let rendered = id.to_string();
        assert_eq!(rendered.len(), 32);
        assert!(rendered
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(
            serde_json::to_string(&id).expect("failed to serialize"),
            format!("\"{rendered}\"")
        );
    }

    #[test]
    fn test_event_ids_are_distinct() {
        let a = Event::new(Level::Info, "a");
        let b = Event::new(Level::Info, "b");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_level_serialization() {
        assert_eq!(
            serde_json::to_string(&Level::Warning).expect("failed to serialize"),
            "\"warning\""
        );
        let level: Level = serde_json::from_str("\"fatal\"").expect("failed to deserialize");
        assert_eq!(level, Level::Fatal);
        assert_eq!(Level::Debug.to_string(), "debug");
    }

    #[test]
    fn test_with_timestamp() {
        let ts = UNIX_EPOCH + Duration::from_secs(1_656_581_409);
        let event = Event::new(Level::Error, "boom").with_timestamp(ts);
        assert_eq!(event.timestamp(), ts);
    }
}
