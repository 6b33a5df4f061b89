//! `CalendarAdapter` over Microsoft Graph (v1.0).

use async_trait::async_trait;
use calmirror_core::adapter::ensure_copy;
use calmirror_core::date_range::DateRange;
use calmirror_core::serializer::{EventSerializer, WirePayload};
use calmirror_core::session::TokenStore;
use calmirror_core::{CalMirrorResult, CalendarAdapter};
use reqwest::RequestBuilder;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::app_config::AppConfig;
use crate::http::{send, send_json};
use crate::remote_config::OutlookRemoteConfig;
use crate::serializer::{OUTLOOK_SERIALIZER, SOURCE_EVENT_ID_PROPERTY, set_source_event_id};
use crate::session::Session;

const PAGE_SIZE: usize = 100;

/// Return every time in UTC so `timeZone` is predictable.
const PREFER_UTC: &str = "outlook.timezone=\"UTC\"";

pub struct OutlookCalendar {
    name: String,
    app: AppConfig,
    remote: OutlookRemoteConfig,
    http: reqwest::Client,
    session: Mutex<Session>,
}

impl OutlookCalendar {
    pub fn new(
        name: impl Into<String>,
        app: AppConfig,
        remote: OutlookRemoteConfig,
        store: TokenStore,
    ) -> CalMirrorResult<Self> {
        let session = Session::load(store, &remote.outlook_account)?;

        Ok(OutlookCalendar {
            name: name.into(),
            app,
            remote,
            http: reqwest::Client::new(),
            session: Mutex::new(session),
        })
    }

    pub fn remote(&self) -> &OutlookRemoteConfig {
        &self.remote
    }

    async fn authorized(&self, request: RequestBuilder) -> CalMirrorResult<RequestBuilder> {
        let token = self
            .session
            .lock()
            .await
            .access_token(&self.http, &self.app)
            .await?;

        Ok(request.bearer_auth(token).header("Prefer", PREFER_UTC))
    }

    fn calendar_url(&self) -> String {
        calendar_url(self.app.api_base(), self.remote.outlook_calendar_id.as_deref())
    }

    /// Events are addressable by id regardless of the calendar they live in.
    fn event_url(&self, event_id: &str) -> String {
        format!("{}/me/events/{}", self.app.api_base(), encode_id(event_id))
    }
}

fn calendar_url(api_base: &str, calendar_id: Option<&str>) -> String {
    match calendar_id {
        Some(id) => format!("{api_base}/me/calendars/{}", encode_id(id)),
        None => format!("{api_base}/me/calendar"),
    }
}

/// Graph ids are base64-ish and may contain `/` and `+`.
fn encode_id(id: &str) -> String {
    url::form_urlencoded::byte_serialize(id.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn expand_marker() -> String {
    format!("singleValueExtendedProperties($filter=id eq '{SOURCE_EVENT_ID_PROPERTY}')")
}

fn collect_page(page: &Value, events: &mut Vec<WirePayload>, max_events: usize) {
    let items = page.get("value").and_then(Value::as_array);

    for item in items.into_iter().flatten() {
        if events.len() >= max_events {
            break;
        }
        if item.get("isCancelled").and_then(Value::as_bool) == Some(true) {
            continue;
        }
        events.push(item.clone());
    }
}

#[async_trait]
impl CalendarAdapter for OutlookCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn serializer(&self) -> &EventSerializer {
        &OUTLOOK_SERIALIZER
    }

    async fn get_events(
        &self,
        range: &DateRange,
        max_events: usize,
    ) -> CalMirrorResult<Vec<WirePayload>> {
        let first = format!("{}/calendarView", self.calendar_url());
        let query = [
            ("startDateTime", range.from_rfc3339()),
            ("endDateTime", range.to_rfc3339()),
            ("$orderby", "start/dateTime".to_string()),
            ("$top", max_events.clamp(1, PAGE_SIZE).to_string()),
            ("$expand", expand_marker()),
        ];

        let mut events = Vec::new();
        let mut next_link: Option<String> = None;

        loop {
            // nextLink already carries the whole query
            let request = match &next_link {
                Some(link) => self.http.get(link),
                None => self.http.get(&first).query(&query),
            };

            debug!(calendar = %self.name, next = next_link.is_some(), "GET calendarView");
            let page: Value = send_json(self.authorized(request).await?).await?;

            collect_page(&page, &mut events, max_events);

            next_link = page
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string);

            if next_link.is_none() || events.len() >= max_events {
                break;
            }
        }

        Ok(events)
    }

    async fn get_event(&self, event_id: &str) -> CalMirrorResult<WirePayload> {
        let request = self
            .http
            .get(self.event_url(event_id))
            .query(&[("$expand", expand_marker())]);
        send_json(self.authorized(request).await?).await
    }

    async fn create_event(
        &self,
        mut payload: WirePayload,
        source_event_id: Option<&str>,
    ) -> CalMirrorResult<WirePayload> {
        if let Some(source) = source_event_id {
            set_source_event_id(&mut payload, source);
        }

        let url = format!("{}/events", self.calendar_url());
        debug!(calendar = %self.name, source = ?source_event_id, "POST event");
        let request = self.http.post(url).json(&payload);
        let mut created: Value = send_json(self.authorized(request).await?).await?;

        // Create responses leave extended properties unexpanded
        if let Some(source) = source_event_id {
            set_source_event_id(&mut created, source);
        }

        Ok(created)
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: WirePayload,
        is_copy: bool,
    ) -> CalMirrorResult<WirePayload> {
        let source = if is_copy {
            Some(ensure_copy(self, event_id, "update").await?)
        } else {
            None
        };

        debug!(calendar = %self.name, id = event_id, "PATCH event");
        let request = self.http.patch(self.event_url(event_id)).json(&payload);
        let mut updated: Value = send_json(self.authorized(request).await?).await?;

        if let Some(source) = source {
            set_source_event_id(&mut updated, &source);
        }

        Ok(updated)
    }

    async fn delete_event(&self, event_id: &str, is_copy: bool) -> CalMirrorResult<()> {
        if is_copy {
            ensure_copy(self, event_id, "delete").await?;
        }

        debug!(calendar = %self.name, id = event_id, "DELETE event");
        let request = self.http.delete(self.event_url(event_id));
        send(self.authorized(request).await?).await?;

        Ok(())
    }
}

/// Calendars the account can write to, as `(id, name)`.
pub async fn list_writable_calendars(
    http: &reqwest::Client,
    app: &AppConfig,
    access_token: &str,
) -> CalMirrorResult<Vec<(String, String)>> {
    let url = format!("{}/me/calendars", app.api_base());
    let list: Value = send_json(http.get(url).bearer_auth(access_token)).await?;

    let calendars = list
        .get("value")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|c| c.get("canEdit").and_then(Value::as_bool) != Some(false))
        .filter_map(|c| {
            let id = c.get("id")?.as_str()?.to_string();
            let name = c.get("name").and_then(Value::as_str).unwrap_or(&id).to_string();
            Some((id, name))
        })
        .collect();

    Ok(calendars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_calendar_url_for_default_and_named_calendars() {
        let base = "https://graph.microsoft.com/v1.0";
        assert_eq!(calendar_url(base, None), "https://graph.microsoft.com/v1.0/me/calendar");
        assert_eq!(
            calendar_url(base, Some("AAMk/AD+w=")),
            "https://graph.microsoft.com/v1.0/me/calendars/AAMk%2FAD%2Bw%3D"
        );
    }

    #[test]
    fn test_expand_filters_on_marker() {
        let expand = expand_marker();
        assert!(expand.starts_with("singleValueExtendedProperties($filter=id eq 'String {"));
        assert!(expand.ends_with("calmirrorSourceEventId')"));
    }

    #[test]
    fn test_collect_page_skips_cancelled() {
        let page = json!({
            "value": [
                { "id": "1", "isCancelled": false },
                { "id": "2", "isCancelled": true },
                { "id": "3" }
            ],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/me/calendarView?$skip=3"
        });

        let mut events = Vec::new();
        collect_page(&page, &mut events, 10);

        let ids: Vec<_> = events.iter().map(|e| e["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
