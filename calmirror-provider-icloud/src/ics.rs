//! Conversion between iCalendar resources and the JSON wire payload.
//!
//! A resource becomes
//!
//! ```text
//! { "href", "etag",
//!   "vevent": { NAME: { "value", "params": { KEY: VALUE } } },
//!   "recurrence": [content lines], "attendees": [content lines],
//!   "selfStatus": PARTSTAT of the account owner }
//! ```
//!
//! Single-valued properties of the master VEVENT land in `vevent`.
//! Recurrence and attendee lines are kept verbatim so that writing the
//! payload back produces the same resource.

use calmirror_core::serializer::WirePayload;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use chrono::NaiveDate;
use icalendar::parser::{Component as ParsedComponent, Property as ParsedProperty};
use icalendar::parser::{read_calendar, unfold};
use icalendar::{Calendar, Component, Property};
use serde_json::{Map, Value, json};

use crate::PROVIDER;

/// Properties that make up an RFC 5545 recurrence set.
const RECURRENCE_PROPERTIES: [&str; 4] = ["RRULE", "RDATE", "EXRULE", "EXDATE"];

fn invalid(href: &str, reason: impl std::fmt::Display) -> CalMirrorError {
    CalMirrorError::invalid_payload(PROVIDER, format!("{href}: {reason}"))
}

/// Parse one event resource. `owner` is the account's address, used to find
/// the owner's own attendee entry.
pub fn to_payload(
    href: &str,
    etag: Option<&str>,
    ics: &str,
    owner: &str,
) -> CalMirrorResult<WirePayload> {
    let unfolded = unfold(ics);
    let calendar = read_calendar(&unfolded).map_err(|e| invalid(href, e))?;
    let vevent = master_event(&calendar.components).ok_or_else(|| invalid(href, "no VEVENT"))?;

    let mut properties = Map::new();
    let mut recurrence = Vec::new();
    let mut attendees = Vec::new();
    let mut self_status = None;

    for property in &vevent.properties {
        let name = property.name.to_string();

        if RECURRENCE_PROPERTIES.contains(&name.as_str()) {
            recurrence.push(content_line(property));
        } else if name == "ATTENDEE" {
            if is_owner(property, owner) {
                self_status = parameter(property, "PARTSTAT");
            }
            attendees.push(content_line(property));
        } else {
            properties.insert(name, property_value(property));
        }
    }

    if !properties.contains_key("DTEND") {
        let implied = implied_end(properties.get("DTSTART"))
            .ok_or_else(|| invalid(href, "no DTSTART"))?;
        properties.insert("DTEND".into(), implied);
    }

    let mut payload = json!({
        "href": href,
        "vevent": properties,
    });
    if let Some(etag) = etag {
        payload["etag"] = json!(etag);
    }
    if !recurrence.is_empty() {
        payload["recurrence"] = json!(recurrence);
    }
    if !attendees.is_empty() {
        payload["attendees"] = json!(attendees);
    }
    if let Some(status) = self_status {
        payload["selfStatus"] = json!(status);
    }

    Ok(payload)
}

/// Render a payload as a VCALENDAR holding one VEVENT.
pub fn to_ics(payload: &WirePayload) -> CalMirrorResult<String> {
    let href = payload.get("href").and_then(Value::as_str).unwrap_or("(new event)");
    let vevent = payload
        .get("vevent")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid(href, "payload has no vevent"))?;

    if !vevent.contains_key("UID") {
        return Err(invalid(href, "VEVENT has no UID"));
    }

    let mut event = icalendar::Event::new();
    for (name, value) in vevent {
        let text = value.get("value").and_then(Value::as_str).unwrap_or_default();
        let mut property = Property::new(name.as_str(), text);
        if let Some(params) = value.get("params").and_then(Value::as_object) {
            for (key, param) in params {
                if let Some(param) = param.as_str() {
                    property.add_parameter(key.as_str(), param);
                }
            }
        }
        event.append_property(property);
    }

    for key in ["recurrence", "attendees"] {
        let lines = payload.get(key).and_then(Value::as_array).into_iter().flatten();
        for line in lines.filter_map(Value::as_str) {
            event.append_multi_property(parse_content_line(line).ok_or_else(|| {
                invalid(href, format!("malformed {key} line '{line}'"))
            })?);
        }
    }

    let mut calendar = Calendar::new();
    calendar.push(event.done());
    Ok(calendar.done().to_string())
}

/// The series master: the VEVENT without a RECURRENCE-ID, else the first one.
fn master_event<'a, 'c>(components: &'a [ParsedComponent<'c>]) -> Option<&'a ParsedComponent<'c>> {
    let mut events = components.iter().filter(|c| c.name == "VEVENT");
    let first = events.clone().next();
    events.find(|c| c.find_prop("RECURRENCE-ID").is_none()).or(first)
}

fn parameter(property: &ParsedProperty<'_>, key: &str) -> Option<String> {
    property
        .params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
}

fn is_owner(attendee: &ParsedProperty<'_>, owner: &str) -> bool {
    let address = attendee.val.to_string();
    let address = address
        .strip_prefix("mailto:")
        .or_else(|| address.strip_prefix("MAILTO:"))
        .unwrap_or(&address);
    address.eq_ignore_ascii_case(owner)
}

fn property_value(property: &ParsedProperty<'_>) -> Value {
    let mut value = json!({ "value": property.val.to_string() });

    let params: Map<String, Value> = property
        .params
        .iter()
        .filter_map(|p| {
            let val = p.val.as_ref()?.to_string();
            Some((p.key.to_string(), Value::String(val)))
        })
        .collect();
    if !params.is_empty() {
        value["params"] = Value::Object(params);
    }

    value
}

/// `NAME;KEY=VALUE:value`, quoting parameter values that need it.
fn content_line(property: &ParsedProperty<'_>) -> String {
    let mut line = property.name.to_string();
    for param in &property.params {
        line.push(';');
        line.push_str(&param.key.to_string());
        if let Some(val) = &param.val {
            let val = val.to_string();
            line.push('=');
            if val.contains([':', ';', ',']) && !val.starts_with('"') {
                line.push_str(&format!("\"{val}\""));
            } else {
                line.push_str(&val);
            }
        }
    }
    line.push(':');
    line.push_str(&property.val.to_string());
    line
}

fn parse_content_line(line: &str) -> Option<Property> {
    let (head, value) = split_head(line)?;
    let mut parts = head.split(';');
    let name = parts.next().filter(|n| !n.is_empty())?;

    let mut property = Property::new(name, value);
    for param in parts {
        let (key, val) = param.split_once('=')?;
        property.add_parameter(key, val.trim_matches('"'));
    }
    Some(property)
}

/// Split at the first colon outside a quoted parameter value.
fn split_head(line: &str) -> Option<(&str, &str)> {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ':' if !quoted => return Some((&line[..i], &line[i + 1..])),
            _ => {}
        }
    }
    None
}

/// RFC 5545 3.6.1: without DTEND a date event lasts one day and a
/// date-time event ends when it starts.
fn implied_end(start: Option<&Value>) -> Option<Value> {
    let start = start?;
    let is_date = start.pointer("/params/VALUE").and_then(Value::as_str) == Some("DATE");
    if !is_date {
        return Some(start.clone());
    }

    let raw = start.get("value").and_then(Value::as_str)?;
    let next = NaiveDate::parse_from_str(raw, "%Y%m%d").ok()?.succ_opt()?;
    let mut end = start.clone();
    end["value"] = json!(next.format("%Y%m%d").to_string());
    Some(end)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "me@icloud.com";

    const RECURRING: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Apple Inc.//iCloud//EN\r\n\
BEGIN:VEVENT\r\n\
UID:series-1\r\n\
DTSTART;TZID=Europe/Paris:20300610T093000\r\n\
DTEND;TZID=Europe/Paris:20300610T103000\r\n\
SUMMARY:Standup\r\n\
RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
EXDATE;TZID=Europe/Paris:20300617T093000\r\n\
ATTENDEE;CN=Boss;PARTSTAT=ACCEPTED:mailto:boss@example.com\r\n\
ATTENDEE;PARTSTAT=DECLINED:mailto:ME@icloud.com\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:series-1\r\n\
RECURRENCE-ID;TZID=Europe/Paris:20300624T093000\r\n\
DTSTART;TZID=Europe/Paris:20300624T110000\r\n\
DTEND;TZID=Europe/Paris:20300624T120000\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_master_event_becomes_the_payload() {
        let payload = to_payload("/cal/series-1.ics", Some("\"1\""), RECURRING, OWNER).unwrap();

        assert_eq!(payload["href"], "/cal/series-1.ics");
        assert_eq!(payload["etag"], "\"1\"");
        assert_eq!(payload["vevent"]["UID"]["value"], "series-1");
        assert_eq!(payload["vevent"]["DTSTART"]["value"], "20300610T093000");
        assert_eq!(payload["vevent"]["DTSTART"]["params"]["TZID"], "Europe/Paris");
        assert!(payload["vevent"].get("RECURRENCE-ID").is_none());
        assert_eq!(
            payload["recurrence"],
            json!([
                "RRULE:FREQ=WEEKLY;BYDAY=MO",
                "EXDATE;TZID=Europe/Paris:20300617T093000"
            ])
        );
    }

    #[test]
    fn test_owner_status_comes_from_matching_attendee() {
        let payload = to_payload("/cal/series-1.ics", None, RECURRING, OWNER).unwrap();

        assert_eq!(payload["selfStatus"], "DECLINED");
        assert_eq!(payload["attendees"].as_array().unwrap().len(), 2);
        assert!(payload.get("etag").is_none());
    }

    #[test]
    fn test_payload_writes_back_to_an_equivalent_resource() {
        let payload = to_payload("/cal/series-1.ics", None, RECURRING, OWNER).unwrap();
        let ics = to_ics(&payload).unwrap();

        assert!(ics.contains("UID:series-1"));
        assert!(ics.contains("RRULE:FREQ=WEEKLY;BYDAY=MO"));

        let again = to_payload("/cal/series-1.ics", None, &ics, OWNER).unwrap();
        assert_eq!(again["vevent"]["DTSTART"], payload["vevent"]["DTSTART"]);
        assert_eq!(again["recurrence"], payload["recurrence"]);
        assert_eq!(again["attendees"], payload["attendees"]);
        assert_eq!(again["selfStatus"], "DECLINED");
    }

    #[test]
    fn test_missing_dtend_is_implied() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:d\r\n\
                   DTSTART;VALUE=DATE:20301231\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let payload = to_payload("/cal/d.ics", None, ics, OWNER).unwrap();

        assert_eq!(payload["vevent"]["DTEND"]["value"], "20310101");
        assert_eq!(payload["vevent"]["DTEND"]["params"]["VALUE"], "DATE");
    }

    #[test]
    fn test_resources_without_events_are_rejected() {
        let ics = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\n\
                   BEGIN:VTODO\r\nUID:t\r\nEND:VTODO\r\nEND:VCALENDAR\r\n";
        assert!(to_payload("/cal/t.ics", None, ics, OWNER).is_err());
    }

    #[test]
    fn test_to_ics_requires_uid() {
        let payload = json!({ "vevent": { "DTSTART": { "value": "20300610T093000Z" } } });
        assert!(to_ics(&payload).is_err());
    }

    #[test]
    fn test_content_lines_split_outside_quotes() {
        assert_eq!(
            split_head("ATTENDEE;CN=\"Doe: Jane\":mailto:jane@example.com"),
            Some(("ATTENDEE;CN=\"Doe: Jane\"", "mailto:jane@example.com"))
        );
        assert_eq!(split_head("no colon here"), None);
        assert!(parse_content_line(":missing-name").is_none());
    }
}
