//! Field-by-field mapping between `Event` and a provider's wire payload.
//!
//! Every provider describes its wire format as a static table of
//! `FieldCodec`s, one per `Field`. An encoder returning `None` means the
//! provider has no outgoing representation for that field (it is left out
//! of the payload); a decoder returning `None` means the provider cannot
//! report it. Clearable fields encode their absence as an explicit `null`
//! so that an update removes what the copy used to carry. A field with no
//! entry in the table at all is a programming error and surfaces as
//! `CalMirrorError::UnsupportedField`.

use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use crate::error::{CalMirrorError, CalMirrorResult};
use crate::event::{Event, Recurrence};

/// Wire payload exchanged with a calendar adapter (always a JSON object).
pub type WirePayload = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Start,
    End,
    Recurrence,
    IsAllDay,
    Id,
    Url,
    SourceEventId,
    Declined,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Start,
        Field::End,
        Field::Recurrence,
        Field::IsAllDay,
        Field::Id,
        Field::Url,
        Field::SourceEventId,
        Field::Declined,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::Start => "start",
            Field::End => "end",
            Field::Recurrence => "recurrence",
            Field::IsAllDay => "is_all_day",
            Field::Id => "id",
            Field::Url => "url",
            Field::SourceEventId => "source_event_id",
            Field::Declined => "declined",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Instant(DateTime<FixedOffset>),
    Flag(bool),
    Text(String),
    Recurrence(Recurrence),
}

pub type Encode = fn(&Event) -> CalMirrorResult<Option<(&'static str, Value)>>;
pub type Decode = fn(&Value) -> CalMirrorResult<Option<FieldValue>>;

pub struct FieldCodec {
    pub field: Field,
    pub encode: Encode,
    pub decode: Decode,
}

/// Encoder for fields a provider never accepts on the way in.
pub fn read_only(_: &Event) -> CalMirrorResult<Option<(&'static str, Value)>> {
    Ok(None)
}

/// Decoder for fields a provider cannot report.
pub fn unreported(_: &Value) -> CalMirrorResult<Option<FieldValue>> {
    Ok(None)
}

/// A provider's serializer: its name plus its field table.
pub struct EventSerializer {
    provider: &'static str,
    codecs: &'static [FieldCodec],
}

impl EventSerializer {
    pub const fn new(provider: &'static str, codecs: &'static [FieldCodec]) -> Self {
        EventSerializer { provider, codecs }
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    fn codec(&self, field: Field) -> CalMirrorResult<&FieldCodec> {
        self.codecs
            .iter()
            .find(|c| c.field == field)
            .ok_or_else(|| CalMirrorError::UnsupportedField {
                provider: self.provider.to_string(),
                field,
            })
    }

    /// Encode one field as `(wire key, wire value)`, or `None` if the
    /// provider has nothing to send for it.
    pub fn serialize(
        &self,
        field: Field,
        event: &Event,
    ) -> CalMirrorResult<Option<(&'static str, Value)>> {
        (self.codec(field)?.encode)(event)
    }

    /// Decode one field, or `None` if the payload cannot supply it.
    pub fn deserialize(
        &self,
        field: Field,
        payload: &Value,
    ) -> CalMirrorResult<Option<FieldValue>> {
        (self.codec(field)?.decode)(payload)
    }

    /// Encode every field of `event` into a single payload object.
    pub fn serialize_event(&self, event: &Event) -> CalMirrorResult<WirePayload> {
        let mut payload = Map::new();
        for field in Field::ALL {
            if let Some((key, value)) = self.serialize(field, event)? {
                merge_into(&mut payload, key, value);
            }
        }
        Ok(Value::Object(payload))
    }

    /// Decode a materialized event from a provider payload.
    pub fn deserialize_event(&self, payload: &Value) -> CalMirrorResult<Event> {
        let id = match self.deserialize(Field::Id, payload)? {
            Some(FieldValue::Text(id)) if !id.is_empty() => id,
            Some(other) => return Err(self.mismatch(Field::Id, &other)),
            _ => return Err(CalMirrorError::invalid_payload(self.provider, "event has no id")),
        };

        let start = self.required_instant(Field::Start, payload)?;
        let end = self.required_instant(Field::End, payload)?;

        let is_all_day = self.optional_flag(Field::IsAllDay, payload)?;
        let declined = self.optional_flag(Field::Declined, payload)?;

        let recurrence = self.optional_recurrence(payload)?;

        let url = self.optional_text(Field::Url, payload)?;
        let source_event_id = self
            .optional_text(Field::SourceEventId, payload)?
            .filter(|s| !s.is_empty());

        let event = Event {
            id: Some(id),
            start,
            end,
            is_all_day,
            recurrence,
            source_event_id,
            declined,
            url,
        };
        event.validate()?;

        Ok(event)
    }

    /// The copied fields of `event` as this provider would store them.
    ///
    /// Anything the wire format cannot carry (a foreign recurrence dialect,
    /// sub-second precision, an all-day flag) comes back the way a copy
    /// written through this serializer would read.
    pub fn normalize(&self, event: &Event) -> CalMirrorResult<Event> {
        let stub = Event::from_origin(event);
        let payload = self.serialize_event(&stub)?;

        Ok(Event {
            start: self.required_instant(Field::Start, &payload)?,
            end: self.required_instant(Field::End, &payload)?,
            is_all_day: self.optional_flag(Field::IsAllDay, &payload)?,
            recurrence: self.optional_recurrence(&payload)?,
            ..stub
        })
    }

    fn required_instant(
        &self,
        field: Field,
        payload: &Value,
    ) -> CalMirrorResult<DateTime<FixedOffset>> {
        match self.deserialize(field, payload)? {
            Some(FieldValue::Instant(dt)) => Ok(dt),
            Some(other) => Err(self.mismatch(field, &other)),
            None => Err(CalMirrorError::invalid_payload(
                self.provider,
                format!("event has no {field}"),
            )),
        }
    }

    fn optional_flag(&self, field: Field, payload: &Value) -> CalMirrorResult<bool> {
        match self.deserialize(field, payload)? {
            Some(FieldValue::Flag(b)) => Ok(b),
            None => Ok(false),
            Some(other) => Err(self.mismatch(field, &other)),
        }
    }

    fn optional_recurrence(&self, payload: &Value) -> CalMirrorResult<Option<Recurrence>> {
        match self.deserialize(Field::Recurrence, payload)? {
            Some(FieldValue::Recurrence(r)) => Ok(Some(r)),
            None => Ok(None),
            Some(other) => Err(self.mismatch(Field::Recurrence, &other)),
        }
    }

    fn optional_text(&self, field: Field, payload: &Value) -> CalMirrorResult<Option<String>> {
        match self.deserialize(field, payload)? {
            Some(FieldValue::Text(s)) => Ok(Some(s)),
            None => Ok(None),
            Some(other) => Err(self.mismatch(field, &other)),
        }
    }

    fn mismatch(&self, field: Field, value: &FieldValue) -> CalMirrorError {
        CalMirrorError::invalid_payload(
            self.provider,
            format!("decoder for {field} produced {value:?}"),
        )
    }
}

/// Insert `value` under `key`, merging objects when two fields share a key.
fn merge_into(payload: &mut Map<String, Value>, key: &str, value: Value) {
    match payload.get_mut(key) {
        Some(Value::Object(existing)) if value.is_object() => {
            if let Value::Object(incoming) = value {
                existing.extend(incoming);
            }
        }
        _ => {
            payload.insert(key.to_string(), value);
        }
    }
}

/// Read a string at a JSON pointer, if present and non-empty.
pub fn text_at(payload: &Value, pointer: &str) -> Option<String> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RecurrenceDialect;
    use chrono::TimeZone;
    use serde_json::json;

    fn encode_start(event: &Event) -> CalMirrorResult<Option<(&'static str, Value)>> {
        Ok(Some(("when", json!({ "start": event.start.to_rfc3339() }))))
    }

    fn encode_end(event: &Event) -> CalMirrorResult<Option<(&'static str, Value)>> {
        Ok(Some(("when", json!({ "end": event.end.to_rfc3339() }))))
    }

    fn decode_start(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
        let s = text_at(payload, "/when/start").unwrap_or_default();
        Ok(DateTime::parse_from_rfc3339(&s).ok().map(FieldValue::Instant))
    }

    fn decode_end(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
        let s = text_at(payload, "/when/end").unwrap_or_default();
        Ok(DateTime::parse_from_rfc3339(&s).ok().map(FieldValue::Instant))
    }

    fn encode_id(event: &Event) -> CalMirrorResult<Option<(&'static str, Value)>> {
        Ok(event.id.clone().map(|id| ("id", Value::String(id))))
    }

    fn decode_id(payload: &Value) -> CalMirrorResult<Option<FieldValue>> {
        Ok(text_at(payload, "/id").map(FieldValue::Text))
    }

    static PARTIAL: [FieldCodec; 3] = [
        FieldCodec {
            field: Field::Start,
            encode: encode_start,
            decode: decode_start,
        },
        FieldCodec {
            field: Field::End,
            encode: encode_end,
            decode: decode_end,
        },
        FieldCodec {
            field: Field::Id,
            encode: encode_id,
            decode: decode_id,
        },
    ];

    static TOY: [FieldCodec; 8] = [
        FieldCodec {
            field: Field::Start,
            encode: encode_start,
            decode: decode_start,
        },
        FieldCodec {
            field: Field::End,
            encode: encode_end,
            decode: decode_end,
        },
        FieldCodec {
            field: Field::Recurrence,
            encode: read_only,
            decode: unreported,
        },
        FieldCodec {
            field: Field::IsAllDay,
            encode: read_only,
            decode: unreported,
        },
        FieldCodec {
            field: Field::Id,
            encode: encode_id,
            decode: decode_id,
        },
        FieldCodec {
            field: Field::Url,
            encode: read_only,
            decode: unreported,
        },
        FieldCodec {
            field: Field::SourceEventId,
            encode: read_only,
            decode: unreported,
        },
        FieldCodec {
            field: Field::Declined,
            encode: read_only,
            decode: unreported,
        },
    ];

    fn make_stub() -> Event {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let mut event = Event::stub(
            tz.with_ymd_and_hms(2024, 8, 1, 10, 0, 0).unwrap(),
            tz.with_ymd_and_hms(2024, 8, 1, 11, 0, 0).unwrap(),
            false,
        );
        event.recurrence = Some(Recurrence {
            dialect: RecurrenceDialect::Opaque,
            payload: json!("weekly"),
        });
        event
    }

    #[test]
    fn test_missing_table_entry_is_unsupported_field() {
        let serializer = EventSerializer::new("partial", &PARTIAL);
        let err = serializer
            .serialize(Field::Recurrence, &make_stub())
            .unwrap_err();

        match err {
            CalMirrorError::UnsupportedField { provider, field } => {
                assert_eq!(provider, "partial");
                assert_eq!(field, Field::Recurrence);
            }
            other => panic!("Expected UnsupportedField, got {:?}", other),
        }

        // Whole-event encoding hits the same gap and must not swallow it
        assert!(serializer.serialize_event(&make_stub()).is_err());
    }

    #[test]
    fn test_fields_sharing_a_key_are_merged() {
        let serializer = EventSerializer::new("toy", &TOY);
        let payload = serializer.serialize_event(&make_stub()).unwrap();

        assert_eq!(payload["when"]["start"], "2024-08-01T10:00:00+02:00");
        assert_eq!(payload["when"]["end"], "2024-08-01T11:00:00+02:00");
        // Stubs have no id and read-only fields are dropped
        assert!(payload.get("id").is_none());
        assert_eq!(payload.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_unreported_fields_deserialize_as_absent() {
        let serializer = EventSerializer::new("toy", &TOY);
        let payload = json!({
            "id": "abc",
            "when": { "start": "2024-08-01T10:00:00+02:00", "end": "2024-08-01T11:00:00+02:00" }
        });

        let event = serializer.deserialize_event(&payload).unwrap();
        assert_eq!(event.id.as_deref(), Some("abc"));
        assert!(!event.declined);
        assert!(!event.is_all_day);
        assert_eq!(event.recurrence, None);
        assert_eq!(event.source_event_id, None);
        assert_eq!(event.url, None);
    }

    #[test]
    fn test_normalize_drops_what_the_wire_cannot_carry() {
        let serializer = EventSerializer::new("toy", &TOY);
        let mut stub = make_stub();
        stub.is_all_day = true;
        stub.source_event_id = Some("elsewhere".into());

        let normalized = serializer.normalize(&stub).unwrap();

        assert_eq!(normalized.start, stub.start);
        assert_eq!(normalized.end, stub.end);
        assert!(!normalized.is_all_day);
        assert_eq!(normalized.recurrence, None);
        assert_eq!(normalized.source_event_id, None);
    }

    #[test]
    fn test_deserialize_requires_id_and_times() {
        let serializer = EventSerializer::new("toy", &TOY);

        let no_id = json!({ "when": { "start": "2024-08-01T10:00:00Z", "end": "2024-08-01T11:00:00Z" } });
        assert!(serializer.deserialize_event(&no_id).is_err());

        let no_end = json!({ "id": "x", "when": { "start": "2024-08-01T10:00:00Z" } });
        assert!(serializer.deserialize_event(&no_end).is_err());

        let inverted = json!({ "id": "x", "when": { "start": "2024-08-01T12:00:00Z", "end": "2024-08-01T11:00:00Z" } });
        assert!(serializer.deserialize_event(&inverted).is_err());
    }
}
