//! CalDAV request bodies and multistatus parsing.
//!
//! Element names are matched on their local name only, so any namespace
//! prefix a server picks (`d:`, `D:`, none) parses the same.

use calmirror_core::date_range::DateRange;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};
use url::Url;

use crate::PROVIDER;

pub const PRINCIPAL_PROPFIND: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:current-user-principal/>
  </d:prop>
</d:propfind>"#;

pub const CALENDAR_HOME_PROPFIND: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <c:calendar-home-set/>
  </d:prop>
</d:propfind>"#;

pub const CALENDARS_PROPFIND: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
    <d:current-user-privilege-set/>
    <c:supported-calendar-component-set/>
  </d:prop>
</d:propfind>"#;

/// calendar-query REPORT for every VEVENT overlapping `range`.
pub fn calendar_query(range: &DateRange) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:getetag/>
    <c:calendar-data/>
  </d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT">
        <c:time-range start="{}" end="{}"/>
      </c:comp-filter>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#,
        format_caldav_datetime(range.from_or_epoch()),
        format_caldav_datetime(range.to_or_far_future())
    )
}

/// `YYYYMMDDTHHMMSSZ`, the form time-range filters take.
pub fn format_caldav_datetime(instant: DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Path of a new event resource inside `calendar`.
pub fn resource_href(calendar: &Url, uid: &str) -> String {
    format!("{}/{uid}.ics", calendar.path().trim_end_matches('/'))
}

/// One event resource from a calendar-query response.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarResource {
    pub href: String,
    pub etag: Option<String>,
    pub data: String,
}

/// A calendar collection found under the calendar home.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCollection {
    pub href: String,
    pub name: String,
}

fn parse(body: &str) -> CalMirrorResult<Document<'_>> {
    Document::parse(body).map_err(|e| {
        CalMirrorError::invalid_payload(PROVIDER, format!("malformed multistatus: {e}"))
    })
}

fn named<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.descendants().find(|n| n.tag_name().name() == name)
}

fn text_of(node: Node<'_, '_>, name: &str) -> Option<String> {
    named(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn responses<'a, 'input>(doc: &'a Document<'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    doc.root_element()
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
}

/// Resources carrying calendar data. Responses without data (deleted, or
/// a 404 propstat) are skipped.
pub fn parse_calendar_resources(body: &str) -> CalMirrorResult<Vec<CalendarResource>> {
    let doc = parse(body)?;

    let resources = responses(&doc)
        .filter_map(|response| {
            let href = text_of(response, "href")?;
            let data = named(response, "calendar-data")?.text()?.to_string();
            let etag = text_of(response, "getetag");
            Some(CalendarResource { href, etag, data })
        })
        .collect();

    Ok(resources)
}

/// The `href` nested in `property`, e.g. `current-user-principal`.
pub fn find_href(body: &str, property: &str) -> CalMirrorResult<Option<String>> {
    let doc = parse(body)?;
    Ok(named(doc.root_element(), property).and_then(|p| text_of(p, "href")))
}

/// Writable event calendars in a calendar-home PROPFIND response.
pub fn parse_calendars(body: &str) -> CalMirrorResult<Vec<CalendarCollection>> {
    let doc = parse(body)?;

    let calendars = responses(&doc)
        .filter(|response| {
            named(*response, "resourcetype").is_some_and(|types| named(types, "calendar").is_some())
        })
        .filter(|response| holds_events(*response) && is_writable(*response))
        .filter_map(|response| {
            let href = text_of(response, "href")?;
            let name = text_of(response, "displayname").unwrap_or_else(|| href.clone());
            Some(CalendarCollection { href, name })
        })
        .collect();

    Ok(calendars)
}

/// Calendars that do not list their components accept events.
fn holds_events(response: Node<'_, '_>) -> bool {
    let Some(set) = named(response, "supported-calendar-component-set") else {
        return true;
    };
    let mut components = set
        .descendants()
        .filter(|n| n.tag_name().name() == "comp")
        .peekable();
    components.peek().is_none() || components.any(|c| c.attribute("name") == Some("VEVENT"))
}

fn is_writable(response: Node<'_, '_>) -> bool {
    let Some(privileges) = named(response, "current-user-privilege-set") else {
        return true;
    };
    privileges.descendants().any(|n| {
        matches!(n.tag_name().name(), "write" | "write-content" | "all")
    })
}
