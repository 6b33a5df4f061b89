//! `CalendarAdapter` over an iCloud CalDAV collection.
//!
//! Event ids are resource hrefs (`/123/calendars/home/<uid>.ics`). Writes
//! are conditional on the ETag read just before, so a concurrent edit in
//! the Calendar app fails the request instead of being overwritten.

use async_trait::async_trait;
use calmirror_core::adapter::{ensure_copy, require_provenance};
use calmirror_core::date_range::DateRange;
use calmirror_core::serializer::{EventSerializer, Field, FieldValue, WirePayload};
use calmirror_core::{CalMirrorError, CalMirrorResult, CalendarAdapter};
use chrono::{DateTime, FixedOffset, Utc};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::caldav::{self, CalendarResource};
use crate::credentials::Credentials;
use crate::http::{dav_method, send, send_text, transport};
use crate::ics;
use crate::remote_config::ICloudRemoteConfig;
use crate::serializer::{ICLOUD_SERIALIZER, SOURCE_EVENT_ID_PROPERTY, set_source_event_id};

const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";
const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

pub struct ICloudCalendar {
    name: String,
    credentials: Credentials,
    remote: ICloudRemoteConfig,
    calendar_url: Url,
    http: reqwest::Client,
}

impl ICloudCalendar {
    pub fn new(
        name: impl Into<String>,
        credentials: Credentials,
        remote: ICloudRemoteConfig,
    ) -> CalMirrorResult<Self> {
        if !credentials.apple_id.eq_ignore_ascii_case(&remote.icloud_account) {
            return Err(CalMirrorError::Config(format!(
                "Credentials for {} cannot open a calendar of {}",
                credentials.apple_id, remote.icloud_account
            )));
        }
        let calendar_url = remote.calendar_url()?;

        Ok(ICloudCalendar {
            name: name.into(),
            credentials,
            remote,
            calendar_url,
            http: reqwest::Client::new(),
        })
    }

    pub fn remote(&self) -> &ICloudRemoteConfig {
        &self.remote
    }

    fn resolve(&self, href: &str) -> CalMirrorResult<Url> {
        self.calendar_url
            .join(href)
            .map_err(|e| CalMirrorError::invalid_payload(crate::PROVIDER, format!("{href}: {e}")))
    }

    async fn put(
        &self,
        href: &str,
        payload: &WirePayload,
        etag: Option<&str>,
    ) -> CalMirrorResult<()> {
        let body = ics::to_ics(payload)?;
        let mut request = self
            .http
            .put(self.resolve(href)?)
            .header(CONTENT_TYPE, ICS_CONTENT_TYPE)
            .body(body);
        request = match etag {
            Some(etag) => request.header(IF_MATCH, etag),
            None => request.header(IF_NONE_MATCH, "*"),
        };

        send(self.credentials.authorize(request)).await?;
        Ok(())
    }
}

/// Parse resources into payloads, earliest first, keeping at most `max_events`.
fn collect_resources(
    resources: Vec<CalendarResource>,
    owner: &str,
    max_events: usize,
) -> Vec<WirePayload> {
    let mut events: Vec<(Option<DateTime<FixedOffset>>, WirePayload)> = resources
        .into_iter()
        .filter_map(|resource| {
            match ics::to_payload(&resource.href, resource.etag.as_deref(), &resource.data, owner) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(href = %resource.href, error = %e, "Skipping unreadable event");
                    None
                }
            }
        })
        .filter(|payload| !is_cancelled(payload))
        .map(|payload| (start_of(&payload), payload))
        .collect();

    events.sort_by_key(|(start, _)| start.map(|s| s.with_timezone(&Utc)));
    events.truncate(max_events);
    events.into_iter().map(|(_, payload)| payload).collect()
}

fn is_cancelled(payload: &WirePayload) -> bool {
    payload
        .pointer("/vevent/STATUS/value")
        .and_then(Value::as_str)
        .is_some_and(|status| status.eq_ignore_ascii_case("CANCELLED"))
}

fn start_of(payload: &WirePayload) -> Option<DateTime<FixedOffset>> {
    match ICLOUD_SERIALIZER.deserialize(Field::Start, payload) {
        Ok(Some(FieldValue::Instant(start))) => Some(start),
        _ => None,
    }
}

/// Apply an update payload to the stored event. `null` removes a property
/// and a `recurrence` key replaces the whole recurrence set. UID and the
/// provenance marker are never touched.
fn merge_update(mut existing: WirePayload, update: &WirePayload) -> CalMirrorResult<WirePayload> {
    let changes = update
        .get("vevent")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let vevent = vevent_mut(&mut existing)?;
    for (name, value) in changes {
        if name == "UID" || name == SOURCE_EVENT_ID_PROPERTY {
            continue;
        }
        if value.is_null() {
            vevent.remove(&name);
        } else {
            vevent.insert(name, value);
        }
    }

    if let (Some(recurrence), Value::Object(fields)) = (update.get("recurrence"), &mut existing) {
        if recurrence.is_null() {
            fields.remove("recurrence");
        } else {
            fields.insert("recurrence".into(), recurrence.clone());
        }
    }

    Ok(existing)
}

fn vevent_mut(payload: &mut WirePayload) -> CalMirrorResult<&mut Map<String, Value>> {
    payload
        .get_mut("vevent")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| CalMirrorError::invalid_payload(crate::PROVIDER, "payload has no vevent"))
}

#[async_trait]
impl CalendarAdapter for ICloudCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn serializer(&self) -> &EventSerializer {
        &ICLOUD_SERIALIZER
    }

    async fn get_events(
        &self,
        range: &DateRange,
        max_events: usize,
    ) -> CalMirrorResult<Vec<WirePayload>> {
        debug!(calendar = %self.name, "REPORT calendar-query");
        let request = self
            .http
            .request(dav_method("REPORT")?, self.calendar_url.clone())
            .header("Depth", "1")
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(caldav::calendar_query(range));
        let body = send_text(self.credentials.authorize(request)).await?;

        let resources = caldav::parse_calendar_resources(&body)?;
        Ok(collect_resources(resources, &self.credentials.apple_id, max_events))
    }

    async fn get_event(&self, event_id: &str) -> CalMirrorResult<WirePayload> {
        let request = self.http.get(self.resolve(event_id)?);
        let response = send(self.credentials.authorize(request)).await?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(transport)?;

        ics::to_payload(event_id, etag.as_deref(), &body, &self.credentials.apple_id)
    }

    async fn create_event(
        &self,
        mut payload: WirePayload,
        source_event_id: Option<&str>,
    ) -> CalMirrorResult<WirePayload> {
        let uid = Uuid::new_v4().to_string();
        let stamp = format!("{}Z", Utc::now().format("%Y%m%dT%H%M%S"));
        {
            let vevent = vevent_mut(&mut payload)?;
            vevent.insert("UID".into(), json!({ "value": uid }));
            vevent.insert("DTSTAMP".into(), json!({ "value": stamp }));
        }
        if let Some(source) = source_event_id {
            set_source_event_id(&mut payload, source);
        }
        if payload.get("recurrence").is_some_and(Value::is_null)
            && let Value::Object(fields) = &mut payload
        {
            fields.remove("recurrence");
        }

        let href = caldav::resource_href(&self.calendar_url, &uid);
        debug!(calendar = %self.name, href = %href, source = ?source_event_id, "PUT new event");
        self.put(&href, &payload, None).await?;

        self.get_event(&href).await
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: WirePayload,
        is_copy: bool,
    ) -> CalMirrorResult<WirePayload> {
        let existing = self.get_event(event_id).await?;
        if is_copy {
            require_provenance(&ICLOUD_SERIALIZER, &existing, event_id, "update")?;
        }

        let etag = existing.get("etag").and_then(Value::as_str).map(str::to_string);
        let merged = merge_update(existing, &payload)?;

        debug!(calendar = %self.name, id = event_id, "PUT event");
        self.put(event_id, &merged, etag.as_deref()).await?;

        self.get_event(event_id).await
    }

    async fn delete_event(&self, event_id: &str, is_copy: bool) -> CalMirrorResult<()> {
        if is_copy {
            ensure_copy(self, event_id, "delete").await?;
        }

        debug!(calendar = %self.name, id = event_id, "DELETE event");
        let request = self.http.delete(self.resolve(event_id)?);
        let response = self
            .credentials
            .authorize(request)
            .send()
            .await
            .map_err(transport)?;

        // Already deleted
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalMirrorError::from_status(status.as_u16(), body));
        }

        Ok(())
    }
}

/// PROPFIND `url`, returning the URL that answered (after redirects) and the body.
async fn propfind(
    http: &reqwest::Client,
    credentials: &Credentials,
    url: Url,
    depth: &str,
    body: &'static str,
) -> CalMirrorResult<(Url, String)> {
    let request = http
        .request(dav_method("PROPFIND")?, url)
        .header("Depth", depth)
        .header(CONTENT_TYPE, XML_CONTENT_TYPE)
        .body(body);
    let response = send(credentials.authorize(request)).await?;
    let answered = response.url().clone();
    let text = response.text().await.map_err(transport)?;
    Ok((answered, text))
}

fn join(base: &Url, href: &str) -> CalMirrorResult<Url> {
    base.join(href)
        .map_err(|e| CalMirrorError::invalid_payload(crate::PROVIDER, format!("{href}: {e}")))
}

/// Writable event calendars of the account, as `(collection url, display name)`.
///
/// Walks principal, then calendar home, then the collections below it.
pub async fn discover_calendars(
    http: &reqwest::Client,
    credentials: &Credentials,
) -> CalMirrorResult<Vec<(String, String)>> {
    let server = Url::parse(&format!("{}/", credentials.server_url()))
        .map_err(|e| CalMirrorError::Config(format!("Invalid iCloud server url: {e}")))?;

    let (answered, body) =
        propfind(http, credentials, server, "0", caldav::PRINCIPAL_PROPFIND).await?;
    let principal = caldav::find_href(&body, "current-user-principal")?
        .ok_or_else(|| CalMirrorError::Auth("Server did not report a principal".into()))?;
    let principal = join(&answered, &principal)?;
    debug!(principal = %principal, "Found principal");

    let (answered, body) =
        propfind(http, credentials, principal, "0", caldav::CALENDAR_HOME_PROPFIND).await?;
    let home = caldav::find_href(&body, "calendar-home-set")?.ok_or_else(|| {
        CalMirrorError::invalid_payload(crate::PROVIDER, "no calendar-home-set")
    })?;
    let home = join(&answered, &home)?;
    debug!(home = %home, "Found calendar home");

    let (answered, body) =
        propfind(http, credentials, home, "1", caldav::CALENDARS_PROPFIND).await?;
    caldav::parse_calendars(&body)?
        .into_iter()
        .map(|c| Ok((join(&answered, &c.href)?.to_string(), c.name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "me@icloud.com";

    fn make_resource(uid: &str, start: &str, extra: &str) -> CalendarResource {
        CalendarResource {
            href: format!("/123/calendars/home/{uid}.ics"),
            etag: Some(format!("\"{uid}\"")),
            data: format!(
                "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:{uid}\r\n\
                 DTSTART:{start}\r\n{extra}END:VEVENT\r\nEND:VCALENDAR\r\n"
            ),
        }
    }

    fn hrefs(events: &[WirePayload]) -> Vec<&str> {
        events.iter().map(|e| e["href"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_resources_sorted_and_capped() {
        let resources = vec![
            make_resource("late", "20300612T090000Z", ""),
            make_resource("early", "20300610T090000Z", ""),
            make_resource("middle", "20300611T090000Z", ""),
        ];

        let events = collect_resources(resources, OWNER, 2);
        assert_eq!(
            hrefs(&events),
            vec!["/123/calendars/home/early.ics", "/123/calendars/home/middle.ics"]
        );
    }

    #[test]
    fn test_cancelled_and_broken_resources_are_dropped() {
        let mut broken = make_resource("broken", "20300610T090000Z", "");
        broken.data = "not a calendar".into();
        let resources = vec![
            make_resource("kept", "20300610T090000Z", ""),
            make_resource("gone", "20300610T100000Z", "STATUS:CANCELLED\r\n"),
            broken,
        ];

        let events = collect_resources(resources, OWNER, 10);
        assert_eq!(hrefs(&events), vec!["/123/calendars/home/kept.ics"]);
    }

    #[test]
    fn test_merge_keeps_identity_and_replaces_times() {
        let existing = json!({
            "href": "/cal/a.ics",
            "etag": "\"1\"",
            "vevent": {
                "UID": { "value": "a" },
                "SUMMARY": { "value": "Copy" },
                "DTSTART": { "value": "20300610T093000", "params": { "TZID": "Europe/Paris" } },
                SOURCE_EVENT_ID_PROPERTY: { "value": "google-1" },
            },
            "recurrence": ["RRULE:FREQ=DAILY"],
        });
        let update = json!({
            "vevent": {
                "UID": { "value": "hijack" },
                "DTSTART": { "value": "20300610T080000Z" },
                SOURCE_EVENT_ID_PROPERTY: { "value": "other" },
            },
            "recurrence": null,
        });

        let merged = merge_update(existing, &update).unwrap();
        assert_eq!(merged["vevent"]["UID"]["value"], "a");
        assert_eq!(merged["vevent"][SOURCE_EVENT_ID_PROPERTY]["value"], "google-1");
        assert_eq!(merged["vevent"]["DTSTART"], json!({ "value": "20300610T080000Z" }));
        assert_eq!(merged["vevent"]["SUMMARY"]["value"], "Copy");
        assert!(merged.get("recurrence").is_none());
    }

    #[test]
    fn test_merge_without_recurrence_key_keeps_it() {
        let existing = json!({
            "vevent": { "UID": { "value": "a" } },
            "recurrence": ["RRULE:FREQ=DAILY"],
        });
        let merged = merge_update(existing, &json!({ "vevent": {} })).unwrap();
        assert_eq!(merged["recurrence"], json!(["RRULE:FREQ=DAILY"]));

        assert!(merge_update(json!({ "href": "/x" }), &json!({})).is_err());
    }

    #[test]
    fn test_new_checks_account_and_url() {
        let credentials = Credentials::new(OWNER, "abcd-efgh-ijkl-mnop");

        let home = "https://p42-caldav.icloud.com/123/calendars/home";
        let calendar = ICloudCalendar::new(
            "family",
            credentials.clone(),
            ICloudRemoteConfig::new("ME@icloud.com", home),
        )
        .unwrap();
        assert_eq!(calendar.name(), "family");
        assert_eq!(
            calendar.resolve("/123/calendars/home/x.ics").unwrap().as_str(),
            "https://p42-caldav.icloud.com/123/calendars/home/x.ics"
        );

        let wrong_account = ICloudCalendar::new(
            "family",
            credentials,
            ICloudRemoteConfig::new("other@icloud.com", "https://p42-caldav.icloud.com/123/"),
        );
        assert!(matches!(wrong_account, Err(CalMirrorError::Config(_))));
    }
}
