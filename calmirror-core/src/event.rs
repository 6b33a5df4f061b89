//! Provider-neutral event types.
//!
//! Providers decode their API payloads into these types through their
//! serializer table, and the synchronizer works exclusively with them.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{CalMirrorError, CalMirrorResult};

/// A calendar event (provider-neutral).
///
/// An event without an `id` is a stub: it only exists to carry data into a
/// create or update call. Events returned by a provider always have an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Provider-assigned identifier (None for stubs)
    pub id: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// When set, `start`/`end` are date boundaries (end exclusive)
    pub is_all_day: bool,
    /// Provider-specific recurrence payload, passed through untouched
    pub recurrence: Option<Recurrence>,

    // Provenance
    /// Id of the origin event this copy was created from (None for originals)
    pub source_event_id: Option<String>,
    /// Whether the account owner declined this event
    pub declined: bool,
    /// Deep link into the provider's UI
    pub url: Option<String>,
}

/// Opaque recurrence data, tagged with the wire format it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub dialect: RecurrenceDialect,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceDialect {
    /// RFC 5545 lines (`RRULE:...`, `EXDATE:...`), as Google stores them
    Rfc5545,
    /// Microsoft Graph `patternedRecurrence` object
    Graph,
    /// Anything else; only providers without a format of their own accept it
    Opaque,
}

impl fmt::Display for RecurrenceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrenceDialect::Rfc5545 => write!(f, "rfc5545"),
            RecurrenceDialect::Graph => write!(f, "graph"),
            RecurrenceDialect::Opaque => write!(f, "opaque"),
        }
    }
}

impl Event {
    /// Build a stub for a new event.
    pub fn stub(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>, is_all_day: bool) -> Self {
        Event {
            id: None,
            start,
            end,
            is_all_day,
            recurrence: None,
            source_event_id: None,
            declined: false,
            url: None,
        }
    }

    /// Build the stub used to copy `origin` onto another calendar.
    ///
    /// Only the time fields and recurrence travel; identity, provenance,
    /// declined status and the deep link stay with the origin.
    pub fn from_origin(origin: &Event) -> Self {
        Event {
            recurrence: origin.recurrence.clone(),
            ..Event::stub(origin.start, origin.end, origin.is_all_day)
        }
    }

    /// Whether this event was created by calmirror.
    pub fn is_copy(&self) -> bool {
        self.source_event_id.is_some()
    }

    pub fn is_stub(&self) -> bool {
        self.id.is_none()
    }

    /// The provider id of a materialized event.
    pub fn require_id(&self) -> CalMirrorResult<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| CalMirrorError::Serialization("event has not been materialized".into()))
    }

    /// Whether the fields a copy inherits differ between the two events.
    ///
    /// Instants compare as UTC, so the same moment in two zones is equal.
    pub fn differs_from(&self, other: &Event) -> bool {
        Event::from_origin(self) != Event::from_origin(other)
    }

    pub fn validate(&self) -> CalMirrorResult<()> {
        if self.start > self.end {
            return Err(CalMirrorError::Serialization(format!(
                "event {} ends before it starts ({} > {})",
                self.id.as_deref().unwrap_or("(stub)"),
                self.start.to_rfc3339(),
                self.end.to_rfc3339()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all_day {
            write!(
                f,
                "{} (all day) → {}",
                self.start.date_naive(),
                self.end.date_naive()
            )
        } else {
            write!(
                f,
                "{} → {}",
                self.start.format("%Y-%m-%d %H:%M %:z"),
                self.end.format("%Y-%m-%d %H:%M %:z")
            )
        }
    }
}

/// The instant an all-day boundary maps to: midnight UTC on `date`.
pub fn all_day_instant(date: NaiveDate) -> DateTime<FixedOffset> {
    date.and_time(NaiveTime::MIN).and_utc().fixed_offset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pacific(y: i32, m: u32, d: u32, h: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .unwrap()
    }

    fn make_materialized() -> Event {
        Event {
            id: Some("evt-1".to_string()),
            start: pacific(2024, 8, 1, 10),
            end: pacific(2024, 8, 1, 11),
            is_all_day: false,
            recurrence: Some(Recurrence {
                dialect: RecurrenceDialect::Rfc5545,
                payload: serde_json::json!(["RRULE:FREQ=WEEKLY;COUNT=2"]),
            }),
            source_event_id: Some("origin-9".to_string()),
            declined: true,
            url: Some("https://calendar.example/evt-1".to_string()),
        }
    }

    #[test]
    fn test_from_origin_copies_only_time_fields() {
        let origin = make_materialized();
        let stub = Event::from_origin(&origin);

        assert_eq!(stub.id, None);
        assert_eq!(stub.source_event_id, None);
        assert!(!stub.declined);
        assert_eq!(stub.url, None);
        assert_eq!(stub.start, origin.start);
        assert_eq!(stub.end, origin.end);
        assert_eq!(stub.recurrence, origin.recurrence);
        assert!(stub.is_stub());
    }

    #[test]
    fn test_stubs_compare_in_utc() {
        let local = make_materialized();
        let mut utc = make_materialized();
        utc.id = Some("evt-2".to_string());
        utc.start = local.start.with_timezone(&chrono::Utc).fixed_offset();
        utc.end = local.end.with_timezone(&chrono::Utc).fixed_offset();

        assert_eq!(Event::from_origin(&local), Event::from_origin(&utc));
        assert!(!local.differs_from(&utc));
    }

    #[test]
    fn test_differs_from_detects_moved_event() {
        let origin = make_materialized();
        let mut moved = make_materialized();
        moved.start = pacific(2024, 8, 2, 10);
        moved.end = pacific(2024, 8, 2, 11);

        assert!(origin.differs_from(&moved));
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut event = make_materialized();
        assert!(event.validate().is_ok());

        std::mem::swap(&mut event.start, &mut event.end);
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_all_day_instant_is_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 2).unwrap();
        let instant = all_day_instant(date);
        assert_eq!(instant.to_rfc3339(), "2024-08-02T00:00:00+00:00");
    }
}
