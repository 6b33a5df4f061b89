//! iCloud event wire format: the JSON view of a VEVENT built by `ics`.
//!
//! Times go out as UTC date-times (`DTSTART:20300610T133000Z`), or as
//! `VALUE=DATE` dates for all-day events. Incoming times may also carry a
//! `TZID` or float; floating times are read as UTC. Provenance is the
//! `X-CALMIRROR-SOURCE-EVENT-ID` property.

use calmirror_core::serializer::{
    EventSerializer, Field, FieldCodec, FieldValue, WirePayload, read_only, text_at, unreported,
};
use calmirror_core::{
    CalMirrorError, CalMirrorResult, Event, Recurrence, RecurrenceDialect, all_day_instant,
};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{Value, json};
use tracing::warn;

use crate::PROVIDER;

/// VEVENT property carrying the origin event id.
pub const SOURCE_EVENT_ID_PROPERTY: &str = "X-CALMIRROR-SOURCE-EVENT-ID";

const ICAL_DATE: &str = "%Y%m%d";
const ICAL_DATETIME: &str = "%Y%m%dT%H%M%S";

pub static ICLOUD_SERIALIZER: EventSerializer = EventSerializer::new(PROVIDER, &CODECS);

static CODECS: [FieldCodec; 8] = [
    FieldCodec {
        field: Field::Start,
        encode: |e| Ok(Some(("vevent", json!({ "DTSTART": encode_time(&e.start, e.is_all_day) })))),
        decode: |p| decode_time(p, "DTSTART"),
    },
    FieldCodec {
        field: Field::End,
        encode: |e| Ok(Some(("vevent", json!({ "DTEND": encode_time(&e.end, e.is_all_day) })))),
        decode: |p| decode_time(p, "DTEND"),
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
        decode: |p| Ok(text_at(p, "/href").map(FieldValue::Text)),
    },
    FieldCodec {
        field: Field::Url,
        encode: read_only,
        decode: unreported,
    },
    FieldCodec {
        field: Field::SourceEventId,
        encode: |e| {
            Ok(e.source_event_id
                .as_deref()
                .map(|id| ("vevent", json!({ SOURCE_EVENT_ID_PROPERTY: { "value": id } }))))
        },
        decode: |p| {
            let pointer = format!("/vevent/{SOURCE_EVENT_ID_PROPERTY}/value");
            Ok(text_at(p, &pointer).map(FieldValue::Text))
        },
    },
    FieldCodec {
        field: Field::Declined,
        encode: read_only,
        decode: |p| {
            Ok(text_at(p, "/selfStatus")
                .map(|status| FieldValue::Flag(status.eq_ignore_ascii_case("DECLINED"))))
        },
    },
];

/// Embed the provenance marker into an outgoing payload.
pub fn set_source_event_id(payload: &mut WirePayload, source_event_id: &str) {
    if let Value::Object(fields) = payload {
        let vevent = fields.entry("vevent").or_insert_with(|| json!({}));
        if !vevent.is_object() {
            *vevent = json!({});
        }
        vevent[SOURCE_EVENT_ID_PROPERTY] = json!({ "value": source_event_id });
    }
}

fn encode_time(instant: &DateTime<FixedOffset>, is_all_day: bool) -> Value {
    let utc = instant.with_timezone(&Utc);
    if is_all_day {
        json!({
            "value": utc.date_naive().format(ICAL_DATE).to_string(),
            "params": { "VALUE": "DATE" },
        })
    } else {
        json!({ "value": format!("{}Z", utc.format(ICAL_DATETIME)) })
    }
}

fn decode_time(payload: &Value, name: &str) -> CalMirrorResult<Option<FieldValue>> {
    let Some(raw) = text_at(payload, &format!("/vevent/{name}/value")) else {
        return Ok(None);
    };
    let value_type = text_at(payload, &format!("/vevent/{name}/params/VALUE"));
    let is_date = value_type.as_deref() == Some("DATE");
    let tzid = text_at(payload, &format!("/vevent/{name}/params/TZID"));

    parse_time(&raw, is_date, tzid.as_deref())
        .map(|dt| Some(FieldValue::Instant(dt)))
        .map_err(|e| CalMirrorError::invalid_payload(PROVIDER, format!("{name}: {e}")))
}

/// Read an iCalendar DATE or DATE-TIME value.
pub fn parse_time(
    raw: &str,
    is_date: bool,
    tzid: Option<&str>,
) -> Result<DateTime<FixedOffset>, String> {
    let unreadable = |e: chrono::ParseError| format!("{raw}: {e}");

    if is_date || raw.len() == 8 {
        let date = NaiveDate::parse_from_str(raw, ICAL_DATE).map_err(unreadable)?;
        return Ok(all_day_instant(date));
    }

    if let Some(utc) = raw.strip_suffix('Z') {
        let local = NaiveDateTime::parse_from_str(utc, ICAL_DATETIME).map_err(unreadable)?;
        return Ok(local.and_utc().fixed_offset());
    }

    let local = NaiveDateTime::parse_from_str(raw, ICAL_DATETIME).map_err(unreadable)?;
    match tzid {
        Some(zone) => {
            let tz: Tz = zone
                .parse()
                .map_err(|e| format!("unknown time zone {zone}: {e}"))?;
            tz.from_local_datetime(&local)
                .earliest()
                .map(|dt| dt.fixed_offset())
                .ok_or_else(|| format!("{raw} does not exist in {zone}"))
        }
        None => Ok(local.and_utc().fixed_offset()),
    }
}

fn decode_all_day(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
    if payload.pointer("/vevent/DTSTART").is_none() {
        return Ok(None);
    }
    let is_date = text_at(payload, "/vevent/DTSTART/params/VALUE").as_deref() == Some("DATE");
    Ok(Some(FieldValue::Flag(is_date)))
}

fn encode_recurrence(event: &Event) -> CalMirrorResult<Option<(&'static str, Value)>> {
    match &event.recurrence {
        Some(r) if r.dialect == RecurrenceDialect::Rfc5545 => {
            Ok(Some(("recurrence", r.payload.clone())))
        }
        Some(r) => {
            warn!(dialect = %r.dialect, "iCloud cannot take this recurrence, dropping it");
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
