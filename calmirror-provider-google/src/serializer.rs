//! Google Calendar event wire format.
//!
//! `start`/`end` are `{ "date": "YYYY-MM-DD" }` for all-day events and
//! `{ "dateTime": RFC 3339, "timeZone": "UTC" }` otherwise. Whether an event
//! is all-day has no key of its own; it is read back from which form
//! `start` takes. Provenance lives in a private extended property.

use calmirror_core::serializer::{
    EventSerializer, Field, FieldCodec, FieldValue, WirePayload, read_only, text_at,
};
use calmirror_core::{
    CalMirrorError, CalMirrorResult, Event, Recurrence, RecurrenceDialect, all_day_instant,
};
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde_json::{Value, json};
use tracing::warn;

use crate::app_config::PROVIDER;

/// Private extended property carrying the origin event id.
pub const SOURCE_EVENT_ID_KEY: &str = "calmirrorSourceEventId";

pub static GOOGLE_SERIALIZER: EventSerializer = EventSerializer::new(PROVIDER, &CODECS);

static CODECS: [FieldCodec; 8] = [
    FieldCodec {
        field: Field::Start,
        encode: |e| Ok(Some(("start", encode_time(&e.start, e.is_all_day)))),
        decode: |p| decode_time(p, "start"),
    },
    FieldCodec {
        field: Field::End,
        encode: |e| Ok(Some(("end", encode_time(&e.end, e.is_all_day)))),
        decode: |p| decode_time(p, "end"),
    },
    FieldCodec {
        field: Field::Recurrence,
        encode: encode_recurrence,
        decode: decode_recurrence,
    },
    FieldCodec {
        field: Field::IsAllDay,
        encode: read_only,
        decode: decode_all_day,
    },
    FieldCodec {
        field: Field::Id,
        encode: read_only,
        decode: |p| Ok(text_at(p, "/id").map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::Url,
        encode: read_only,
        decode: |p| Ok(text_at(p, "/htmlLink").map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::SourceEventId,
        encode: |e| {
            Ok(e.source_event_id
                .as_deref()
                .map(|id| ("extendedProperties", extended_properties(id))))
        },
        decode: |p| {
            let pointer = format!("/extendedProperties/private/{SOURCE_EVENT_ID_KEY}");
            Ok(text_at(p, &pointer).map(FieldValue::Text))
        },
    },
    FieldCodec {
        field: Field::Declined,
        encode: read_only,
        decode: decode_declined,
    },
];

fn extended_properties(source_event_id: &str) -> Value {
    json!({ "private": { SOURCE_EVENT_ID_KEY: source_event_id } })
}

/// Embed the provenance marker into an outgoing payload.
pub fn set_source_event_id(payload: &mut WirePayload, source_event_id: &str) {
    if let Value::Object(fields) = payload {
        let properties = fields
            .entry("extendedProperties")
            .or_insert_with(|| json!({}));
        if !properties.is_object() {
            *properties = json!({});
        }
        properties["private"][SOURCE_EVENT_ID_KEY] = json!(source_event_id);
    }
}

fn encode_time(instant: &DateTime<FixedOffset>, is_all_day: bool) -> Value {
    let utc = instant.with_timezone(&Utc);
    if is_all_day {
        json!({ "date": utc.date_naive().format("%Y-%m-%d").to_string() })
    } else {
        json!({
            "dateTime": utc.to_rfc3339_opts(SecondsFormat::Secs, true),
            "timeZone": "UTC",
        })
    }
}

fn decode_time(payload: &Value, key: &str) -> CalMirrorResult<Option<FieldValue>> {
    let invalid = |e: String| CalMirrorError::invalid_payload(PROVIDER, format!("{key}: {e}"));

    if let Some(date) = text_at(payload, &format!("/{key}/date")) {
        let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| invalid(e.to_string()))?;
        return Ok(Some(FieldValue::Instant(all_day_instant(date))));
    }

    match text_at(payload, &format!("/{key}/dateTime")) {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(FieldValue::Instant(dt)))
            .map_err(|e| invalid(e.to_string())),
        None => Ok(None),
    }
}

fn decode_all_day(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
    if payload.pointer("/start/date").is_some() {
        Ok(Some(FieldValue::Flag(true)))
    } else if payload.pointer("/start/dateTime").is_some() {
        Ok(Some(FieldValue::Flag(false)))
    } else {
        Ok(None)
    }
}

fn encode_recurrence(event: &Event) -> CalMirrorResult<Option<(&'static str, Value)>> {
    match &event.recurrence {
        Some(r) if r.dialect == RecurrenceDialect::Rfc5545 => {
            Ok(Some(("recurrence", r.payload.clone())))
        }
        Some(r) => {
            warn!(dialect = %r.dialect, "Google cannot take this recurrence, dropping it");
            Ok(Some(("recurrence", Value::Null)))
        }
        None => Ok(Some(("recurrence", Value::Null))),
    }
}

fn decode_recurrence(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
    match payload.get("recurrence") {
        Some(lines) if lines.as_array().is_some_and(|items| !items.is_empty()) => {
            Ok(Some(FieldValue::Recurrence(Recurrence {
                dialect: RecurrenceDialect::Rfc5545,
                payload: lines.clone(),
            })))
        }
        _ => Ok(None),
    }
}

/// The account owner's response, when they are listed as an attendee.
fn decode_declined(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
    let Some(attendees) = payload.get("attendees").and_then(Value::as_array) else {
        return Ok(None);
    };

    let declined = attendees
        .iter()
        .find(|a| a.get("self").and_then(Value::as_bool) == Some(true))
        .map(|me| me.get("responseStatus").and_then(Value::as_str) == Some("declined"));

    Ok(declined.map(FieldValue::Flag))
}
