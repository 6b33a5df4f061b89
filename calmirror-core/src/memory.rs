//! In-process calendar adapter.
//!
//! Holds wire payloads in memory behind the same `CalendarAdapter` contract
//! the network providers implement. Used by the test-suite and for trying
//! out a configuration without touching real accounts.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use crate::adapter::{CalendarAdapter, require_provenance};
use crate::date_range::DateRange;
use crate::error::{CalMirrorError, CalMirrorResult};
use crate::event::{Event, Recurrence};
use crate::serializer::{EventSerializer, Field, FieldCodec, FieldValue, WirePayload, text_at};

const PROVIDER: &str = "memory";

pub static MEMORY_SERIALIZER: EventSerializer = EventSerializer::new(PROVIDER, &CODECS);

static CODECS: [FieldCodec; 8] = [
    FieldCodec {
        field: Field::Start,
        encode: |e| Ok(Some(("start", json!(e.start.to_rfc3339())))),
        decode: |p| decode_instant(p, "/start"),
    },
    FieldCodec {
        field: Field::End,
        encode: |e| Ok(Some(("end", json!(e.end.to_rfc3339())))),
        decode: |p| decode_instant(p, "/end"),
    },
    FieldCodec {
        field: Field::Recurrence,
        encode: encode_recurrence,
        decode: decode_recurrence,
    },
    FieldCodec {
        field: Field::IsAllDay,
        encode: |e| Ok(Some(("allDay", json!(e.is_all_day)))),
        decode: |p| Ok(p.get("allDay").and_then(Value::as_bool).map(FieldValue::Flag)),
    },
    FieldCodec {
        field: Field::Id,
        encode: |e| Ok(e.id.clone().map(|id| ("id", Value::String(id)))),
        decode: |p| Ok(text_at(p, "/id").map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::Url,
        encode: |e| Ok(e.url.clone().map(|url| ("url", Value::String(url)))),
        decode: |p| Ok(text_at(p, "/url").map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::SourceEventId,
        encode: |e| {
            Ok(e.source_event_id
                .clone()
                .map(|id| ("sourceEventId", Value::String(id))))
        },
        decode: |p| Ok(text_at(p, "/sourceEventId").map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::Declined,
        encode: |e| Ok(Some(("declined", json!(e.declined)))),
        decode: |p| Ok(p.get("declined").and_then(Value::as_bool).map(FieldValue::Flag)),
    },
];

fn decode_instant(payload: &Value, pointer: &str) -> CalMirrorResult<Option<FieldValue>> {
    let Some(raw) = text_at(payload, pointer) else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| Some(FieldValue::Instant(dt)))
        .map_err(|e| CalMirrorError::invalid_payload(PROVIDER, format!("{pointer}: {e}")))
}

fn encode_recurrence(event: &Event) -> CalMirrorResult<Option<(&'static str, Value)>> {
    match &event.recurrence {
        Some(r) => Ok(Some(("recurrence", serde_json::to_value(r)?))),
        None => Ok(Some(("recurrence", Value::Null))),
    }
}

fn decode_recurrence(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
    match payload.get("recurrence") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => {
            let recurrence: Recurrence = serde_json::from_value(raw.clone())?;
            Ok(Some(FieldValue::Recurrence(recurrence)))
        }
    }
}

/// A calendar that lives in memory.
pub struct MemoryCalendar {
    name: String,
    events: Mutex<Vec<WirePayload>>,
    next_id: AtomicUsize,
    fail_writes: AtomicBool,
    unavailable: AtomicBool,
}

impl MemoryCalendar {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryCalendar {
            name: name.into(),
            events: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            fail_writes: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Add a user-authored event (no provenance marker) and return it materialized.
    pub async fn add_origin(&self, event: &Event) -> CalMirrorResult<Event> {
        let payload = MEMORY_SERIALIZER.serialize_event(&Event::from_origin(event))?;
        let created = self.insert(payload, None).await?;
        MEMORY_SERIALIZER.deserialize_event(&created)
    }

    /// Mark an event as declined by the account owner.
    pub async fn decline(&self, event_id: &str) -> CalMirrorResult<()> {
        let mut events = self.events.lock().await;
        let payload = find_mut(&mut events, event_id)?;
        payload["declined"] = Value::Bool(true);
        Ok(())
    }

    /// Move an event to new times, as a user editing it would.
    pub async fn reschedule(
        &self,
        event_id: &str,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> CalMirrorResult<()> {
        let mut events = self.events.lock().await;
        let payload = find_mut(&mut events, event_id)?;
        payload["start"] = json!(start.to_rfc3339());
        payload["end"] = json!(end.to_rfc3339());
        Ok(())
    }

    /// Remove an event without any provenance checks.
    pub async fn remove(&self, event_id: &str) -> CalMirrorResult<()> {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|p| text_at(p, "/id").as_deref() != Some(event_id));
        if events.len() == before {
            return Err(CalMirrorError::NotFound(event_id.to_string()));
        }
        Ok(())
    }

    /// Every stored event, decoded.
    pub async fn events(&self) -> CalMirrorResult<Vec<Event>> {
        let events = self.events.lock().await;
        events
            .iter()
            .map(|p| MEMORY_SERIALIZER.deserialize_event(p))
            .collect()
    }

    /// Make every subsequent create/update fail with a transport error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make listing report the calendar as not found.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_writable(&self) -> CalMirrorResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CalMirrorError::Transport {
                status: Some(503),
                message: format!("{} is not accepting writes", self.name),
            });
        }
        Ok(())
    }

    async fn insert(&self, payload: WirePayload, source_event_id: Option<&str>) -> CalMirrorResult<WirePayload> {
        let Value::Object(mut fields) = payload else {
            return Err(CalMirrorError::invalid_payload(PROVIDER, "payload is not an object"));
        };

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}-{}", self.name, n);

        fields.insert("id".into(), json!(id));
        fields.insert("url".into(), json!(format!("memory://{}/{}", self.name, id)));
        fields.entry("declined").or_insert(json!(false));
        if let Some(source) = source_event_id {
            fields.insert("sourceEventId".into(), json!(source));
        }

        let created = Value::Object(fields);
        self.events.lock().await.push(created.clone());

        debug!(calendar = %self.name, id = %id, "Stored event");
        Ok(created)
    }
}

fn find_mut<'a>(events: &'a mut [WirePayload], event_id: &str) -> CalMirrorResult<&'a mut WirePayload> {
    events
        .iter_mut()
        .find(|p| text_at(p, "/id").as_deref() == Some(event_id))
        .ok_or_else(|| CalMirrorError::NotFound(event_id.to_string()))
}

fn start_of(payload: &WirePayload) -> Option<DateTime<Utc>> {
    text_at(payload, "/start")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl CalendarAdapter for MemoryCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn serializer(&self) -> &EventSerializer {
        &MEMORY_SERIALIZER
    }

    async fn get_events(
        &self,
        range: &DateRange,
        max_events: usize,
    ) -> CalMirrorResult<Vec<WirePayload>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CalMirrorError::NotFound(format!("calendar {}", self.name)));
        }

        let events = self.events.lock().await;
        let mut listed: Vec<WirePayload> = events
            .iter()
            .filter(|p| start_of(p).is_some_and(|s| range.contains(s)))
            .cloned()
            .collect();

        // Stable sort keeps insertion order for equal starts
        listed.sort_by_key(start_of);
        listed.truncate(max_events);
        Ok(listed)
    }

    async fn get_event(&self, event_id: &str) -> CalMirrorResult<WirePayload> {
        let events = self.events.lock().await;
        events
            .iter()
            .find(|p| text_at(p, "/id").as_deref() == Some(event_id))
            .cloned()
            .ok_or_else(|| CalMirrorError::NotFound(event_id.to_string()))
    }

    async fn create_event(
        &self,
        payload: WirePayload,
        source_event_id: Option<&str>,
    ) -> CalMirrorResult<WirePayload> {
        self.check_writable()?;
        self.insert(payload, source_event_id).await
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: WirePayload,
        is_copy: bool,
    ) -> CalMirrorResult<WirePayload> {
        self.check_writable()?;

        let mut events = self.events.lock().await;
        let existing = find_mut(&mut events, event_id)?;
        if is_copy {
            require_provenance(&MEMORY_SERIALIZER, existing, event_id, "update")?;
        }

        let Value::Object(changes) = payload else {
            return Err(CalMirrorError::invalid_payload(PROVIDER, "payload is not an object"));
        };
        if let Value::Object(fields) = existing {
            for (key, value) in changes {
                // Identity and provenance are not editable
                if matches!(key.as_str(), "id" | "url" | "sourceEventId") {
                    continue;
                }
                fields.insert(key, value);
            }
        }

        Ok(existing.clone())
    }

    async fn delete_event(&self, event_id: &str, is_copy: bool) -> CalMirrorResult<()> {
        let mut events = self.events.lock().await;
        let index = events
            .iter()
            .position(|p| text_at(p, "/id").as_deref() == Some(event_id))
            .ok_or_else(|| CalMirrorError::NotFound(event_id.to_string()))?;

        if is_copy {
            require_provenance(&MEMORY_SERIALIZER, &events[index], event_id, "delete")?;
        }

        events.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecurrenceDialect;
    use chrono::{Datelike, TimeZone};

    fn make_event(day: u32) -> Event {
        let start = Utc.with_ymd_and_hms(2030, 1, day, 10, 0, 0).unwrap().fixed_offset();
        Event::stub(start, start + chrono::Duration::hours(1), false)
    }

    fn everything() -> DateRange {
        DateRange { from: None, to: None }
    }

    #[tokio::test]
    async fn test_create_embeds_provenance() {
        let calendar = MemoryCalendar::new("a");
        let payload = MEMORY_SERIALIZER.serialize_event(&make_event(1)).unwrap();

        let created = calendar.create_event(payload, Some("origin-1")).await.unwrap();
        let event = MEMORY_SERIALIZER.deserialize_event(&created).unwrap();

        assert_eq!(event.id.as_deref(), Some("a-1"));
        assert_eq!(event.source_event_id.as_deref(), Some("origin-1"));
        assert!(event.is_copy());
    }

    #[tokio::test]
    async fn test_delete_copy_refuses_origin() {
        let calendar = MemoryCalendar::new("a");
        let origin = calendar.add_origin(&make_event(1)).await.unwrap();
        let id = origin.id.unwrap();

        let err = calendar.delete_event(&id, true).await.unwrap_err();
        assert!(matches!(err, CalMirrorError::ProvenanceMissing { operation: "delete", .. }));
        assert_eq!(calendar.events().await.unwrap().len(), 1);

        calendar.delete_event(&id, false).await.unwrap();
        assert!(calendar.events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_copy_refuses_origin() {
        let calendar = MemoryCalendar::new("a");
        let origin = calendar.add_origin(&make_event(1)).await.unwrap();
        let id = origin.id.unwrap();
        let changes = MEMORY_SERIALIZER.serialize_event(&make_event(2)).unwrap();

        let err = calendar.update_event(&id, changes, true).await.unwrap_err();
        assert!(matches!(err, CalMirrorError::ProvenanceMissing { operation: "update", .. }));
    }

    #[tokio::test]
    async fn test_update_keeps_provenance() {
        let calendar = MemoryCalendar::new("a");
        let payload = MEMORY_SERIALIZER.serialize_event(&make_event(1)).unwrap();
        let created = calendar.create_event(payload, Some("origin-1")).await.unwrap();
        let id = text_at(&created, "/id").unwrap();

        let changes = MEMORY_SERIALIZER.serialize_event(&make_event(3)).unwrap();
        let updated = calendar.update_event(&id, changes, true).await.unwrap();
        let event = MEMORY_SERIALIZER.deserialize_event(&updated).unwrap();

        assert_eq!(event.start, make_event(3).start);
        assert_eq!(event.source_event_id.as_deref(), Some("origin-1"));
    }

    #[tokio::test]
    async fn test_get_events_sorted_and_capped() {
        let calendar = MemoryCalendar::new("a");
        for day in [5, 2, 9, 1] {
            calendar.add_origin(&make_event(day)).await.unwrap();
        }

        let listed = calendar.get_events(&everything(), 3).await.unwrap();
        let days: Vec<_> = listed
            .iter()
            .map(|p| MEMORY_SERIALIZER.deserialize_event(p).unwrap().start.day())
            .collect();
        assert_eq!(days, vec![1, 2, 5]);
    }

    #[tokio::test]
    async fn test_recurrence_round_trips_any_dialect() {
        let calendar = MemoryCalendar::new("a");
        let mut event = make_event(1);
        event.recurrence = Some(Recurrence {
            dialect: RecurrenceDialect::Graph,
            payload: json!({ "pattern": { "type": "weekly", "interval": 1 } }),
        });

        let created = calendar.add_origin(&event).await.unwrap();
        assert_eq!(created.recurrence, event.recurrence);
    }

    #[tokio::test]
    async fn test_update_without_recurrence_clears_it() {
        let calendar = MemoryCalendar::new("a");
        let mut event = make_event(1);
        event.recurrence = Some(Recurrence {
            dialect: RecurrenceDialect::Opaque,
            payload: json!("weekly"),
        });
        let payload = MEMORY_SERIALIZER.serialize_event(&event).unwrap();
        let created = calendar.create_event(payload, Some("origin-1")).await.unwrap();
        let id = text_at(&created, "/id").unwrap();

        let changes = MEMORY_SERIALIZER.serialize_event(&make_event(1)).unwrap();
        assert_eq!(changes["recurrence"], Value::Null);

        let updated = calendar.update_event(&id, changes, true).await.unwrap();
        let event = MEMORY_SERIALIZER.deserialize_event(&updated).unwrap();
        assert_eq!(event.recurrence, None);
    }
}
