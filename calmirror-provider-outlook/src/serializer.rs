//! Microsoft Graph event wire format.

use calmirror_core::serializer::{
    EventSerializer, Field, FieldCodec, FieldValue, WirePayload, read_only, text_at,
};
use calmirror_core::{
    CalMirrorError, CalMirrorResult, Event, Recurrence, RecurrenceDialect, all_day_instant,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Value, json};
use tracing::warn;

use crate::app_config::PROVIDER;

/// Single-value extended property carrying the origin event id.
pub const SOURCE_EVENT_ID_PROPERTY: &str =
    "String {66f5a359-4659-4830-9070-00047ec6ac6e} Name calmirrorSourceEventId";

const GRAPH_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";

pub static OUTLOOK_SERIALIZER: EventSerializer = EventSerializer::new(PROVIDER, &CODECS);

static CODECS: [FieldCodec; 8] = [
    FieldCodec {
        field: Field::Start,
        encode: |e| Ok(Some(("start", encode_time(&e.start)))),
        decode: |p| decode_time(p, "start"),
    },
    FieldCodec {
        field: Field::End,
        encode: |e| Ok(Some(("end", encode_time(&e.end)))),
        decode: |p| decode_time(p, "end"),
    },
    FieldCodec {
        field: Field::Recurrence,
        encode: encode_recurrence,
        decode: decode_recurrence,
    },
    FieldCodec {
        field: Field::IsAllDay,
        encode: |e| Ok(Some(("isAllDay", json!(e.is_all_day)))),
        decode: |p| Ok(p.get("isAllDay").and_then(Value::as_bool).map(FieldValue::Flag)),
    },
    FieldCodec {
        field: Field::Id,
        encode: read_only,
        decode: |p| Ok(text_at(p, "/id").map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::Url,
        encode: read_only,
        decode: |p| Ok(text_at(p, "/webLink").map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::SourceEventId,
        encode: |e| {
            Ok(e.source_event_id
                .as_deref()
                .map(|id| ("singleValueExtendedProperties", json!([property(id)]))))
        },
        decode: |p| Ok(source_event_id(p).map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::Declined,
        encode: read_only,
        decode: |p| {
            Ok(text_at(p, "/responseStatus/response")
                .map(|response| FieldValue::Flag(response == "declined")))
        },
    },
];

fn property(source_event_id: &str) -> Value {
    json!({ "id": SOURCE_EVENT_ID_PROPERTY, "value": source_event_id })
}

fn is_marker(property: &Value) -> bool {
    property
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| id.eq_ignore_ascii_case(SOURCE_EVENT_ID_PROPERTY))
}

fn source_event_id(payload: &Value) -> Option<String> {
    payload
        .get("singleValueExtendedProperties")
        .and_then(Value::as_array)?
        .iter()
        .find(|p| is_marker(p))
        .and_then(|p| p.get("value"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Embed the provenance marker, replacing any previous one.
pub fn set_source_event_id(payload: &mut WirePayload, source_event_id: &str) {
    let Value::Object(fields) = payload else {
        return;
    };

    let properties = fields
        .entry("singleValueExtendedProperties")
        .or_insert_with(|| json!([]));
    if !properties.is_array() {
        *properties = json!([]);
    }
    if let Value::Array(items) = properties {
        items.retain(|p| !is_marker(p));
        items.push(property(source_event_id));
    }
}

/// Graph takes a zone-less local time plus a zone name; everything goes out as UTC.
fn encode_time(instant: &DateTime<FixedOffset>) -> Value {
    json!({
        "dateTime": instant.with_timezone(&Utc).format(GRAPH_DATETIME).to_string(),
        "timeZone": "UTC",
    })
}

fn decode_time(payload: &Value, key: &str) -> CalMirrorResult<Option<FieldValue>> {
    let invalid = |e: String| CalMirrorError::invalid_payload(PROVIDER, format!("{key}: {e}"));

    let Some(raw) = text_at(payload, &format!("/{key}/dateTime")) else {
        return Ok(None);
    };
    // Graph sends seven fractional digits, e.g. 2030-06-10T13:30:00.0000000
    let local = NaiveDateTime::parse_from_str(&raw, &format!("{GRAPH_DATETIME}%.f"))
        .map_err(|e| invalid(format!("{raw}: {e}")))?;

    if payload.get("isAllDay").and_then(Value::as_bool) == Some(true) {
        return Ok(Some(FieldValue::Instant(all_day_instant(local.date()))));
    }

    let zone = text_at(payload, &format!("/{key}/timeZone")).unwrap_or_else(|| "UTC".into());
    let instant = if zone.eq_ignore_ascii_case("UTC") {
        local.and_utc().fixed_offset()
    } else {
        let tz: Tz = zone
            .parse()
            .map_err(|e| invalid(format!("unknown time zone {zone}: {e}")))?;
        tz.from_local_datetime(&local)
            .earliest()
            .ok_or_else(|| invalid(format!("{raw} does not exist in {zone}")))?
            .fixed_offset()
    };

    Ok(Some(FieldValue::Instant(instant)))
}

fn encode_recurrence(event: &Event) -> CalMirrorResult<Option<(&'static str, Value)>> {
    match &event.recurrence {
        Some(r) if r.dialect == RecurrenceDialect::Graph => Ok(Some(("recurrence", r.payload.clone()))),
        Some(r) => {
            warn!(dialect = %r.dialect, "Outlook cannot take this recurrence, dropping it");
            Ok(Some(("recurrence", Value::Null)))
        }
        None => Ok(Some(("recurrence", Value::Null))),
    }
}

fn decode_recurrence(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
    match payload.get("recurrence") {
        Some(pattern) if pattern.is_object() => Ok(Some(FieldValue::Recurrence(Recurrence {
            dialect: RecurrenceDialect::Graph,
            payload: pattern.clone(),
        }))),
        _ => Ok(None),
    }
}
