//! `CalendarAdapter` over the Google Calendar REST API (v3).

use async_trait::async_trait;
use calmirror_core::adapter::ensure_copy;
use calmirror_core::date_range::DateRange;
use calmirror_core::serializer::{EventSerializer, WirePayload};
use calmirror_core::session::TokenStore;
use calmirror_core::{CalMirrorError, CalMirrorResult, CalendarAdapter};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::app_config::AppConfig;
use crate::http::{send_json, transport};
use crate::remote_config::GoogleRemoteConfig;
use crate::serializer::{GOOGLE_SERIALIZER, set_source_event_id};
use crate::session::Session;

/// Largest page the events endpoint serves.
const MAX_PAGE_SIZE: usize = 250;

pub struct GoogleCalendar {
    name: String,
    app: AppConfig,
    remote: GoogleRemoteConfig,
    http: reqwest::Client,
    session: Mutex<Session>,
}

impl GoogleCalendar {
    pub fn new(
        name: impl Into<String>,
        app: AppConfig,
        remote: GoogleRemoteConfig,
        store: TokenStore,
    ) -> CalMirrorResult<Self> {
        let session = Session::load(store, &remote.google_account)?;

        Ok(GoogleCalendar {
            name: name.into(),
            app,
            remote,
            http: reqwest::Client::new(),
            session: Mutex::new(session),
        })
    }

    pub fn remote(&self) -> &GoogleRemoteConfig {
        &self.remote
    }

    async fn token(&self) -> CalMirrorResult<String> {
        self.session
            .lock()
            .await
            .access_token(&self.http, &self.app)
            .await
    }

    /// `{api_base}/calendars/{calendar_id}/events[/{event_id}]`
    fn events_url(&self, event_id: Option<&str>) -> CalMirrorResult<Url> {
        events_url(self.app.api_base(), &self.remote.google_calendar_id, event_id)
    }
}

fn events_url(api_base: &str, calendar_id: &str, event_id: Option<&str>) -> CalMirrorResult<Url> {
    let mut url =
        Url::parse(api_base).map_err(|e| CalMirrorError::Config(format!("Invalid api_base: {e}")))?;

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| CalMirrorError::Config(format!("api_base {api_base} cannot take a path")))?;
        segments.pop_if_empty().extend(["calendars", calendar_id, "events"]);
        if let Some(id) = event_id {
            segments.push(id);
        }
    }

    Ok(url)
}

/// Append the live items of one listing page to `events`, stopping at `max_events`.
fn collect_page(page: &Value, events: &mut Vec<WirePayload>, max_events: usize) {
    let items = page.get("items").and_then(Value::as_array);

    for item in items.into_iter().flatten() {
        if events.len() >= max_events {
            break;
        }
        if item.get("status").and_then(Value::as_str) == Some("cancelled") {
            continue;
        }
        events.push(item.clone());
    }
}

#[async_trait]
impl CalendarAdapter for GoogleCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn serializer(&self) -> &EventSerializer {
        &GOOGLE_SERIALIZER
    }

    async fn get_events(
        &self,
        range: &DateRange,
        max_events: usize,
    ) -> CalMirrorResult<Vec<WirePayload>> {
        let url = self.events_url(None)?;
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_size = (max_events - events.len()).clamp(1, MAX_PAGE_SIZE);
            let mut query = vec![
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("timeMin", range.from_rfc3339()),
                ("timeMax", range.to_rfc3339()),
                ("maxResults", page_size.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            debug!(calendar = %self.name, page = ?page_token, "GET events");
            let token = self.token().await?;
            let page: Value =
                send_json(self.http.get(url.clone()).bearer_auth(token).query(&query)).await?;

            collect_page(&page, &mut events, max_events);

            page_token = page
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string);

            if page_token.is_none() || events.len() >= max_events {
                break;
            }
        }

        Ok(events)
    }

    async fn get_event(&self, event_id: &str) -> CalMirrorResult<WirePayload> {
        let url = self.events_url(Some(event_id))?;
        let token = self.token().await?;
        send_json(self.http.get(url).bearer_auth(token)).await
    }

    async fn create_event(
        &self,
        mut payload: WirePayload,
        source_event_id: Option<&str>,
    ) -> CalMirrorResult<WirePayload> {
        if let Some(source) = source_event_id {
            set_source_event_id(&mut payload, source);
        }

        let url = self.events_url(None)?;
        debug!(calendar = %self.name, source = ?source_event_id, "POST event");
        let token = self.token().await?;
        send_json(self.http.post(url).bearer_auth(token).json(&payload)).await
    }

    async fn update_event(
        &self,
        event_id: &str,
        payload: WirePayload,
        is_copy: bool,
    ) -> CalMirrorResult<WirePayload> {
        if is_copy {
            ensure_copy(self, event_id, "update").await?;
        }

        let url = self.events_url(Some(event_id))?;
        debug!(calendar = %self.name, id = event_id, "PATCH event");
        let token = self.token().await?;
        send_json(self.http.patch(url).bearer_auth(token).json(&payload)).await
    }

    async fn delete_event(&self, event_id: &str, is_copy: bool) -> CalMirrorResult<()> {
        if is_copy {
            ensure_copy(self, event_id, "delete").await?;
        }

        let url = self.events_url(Some(event_id))?;
        debug!(calendar = %self.name, id = event_id, "DELETE event");
        let token = self.token().await?;

        let response = self
            .http
            .delete(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;

        // Already deleted
        if response.status() == StatusCode::GONE {
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

/// Calendars the account can write to, as `(id, summary)`.
pub async fn list_writable_calendars(
    http: &reqwest::Client,
    app: &AppConfig,
    access_token: &str,
) -> CalMirrorResult<Vec<(String, String)>> {
    let url = format!("{}/users/me/calendarList", app.api_base());
    let list: Value = send_json(
        http.get(url)
            .bearer_auth(access_token)
            .query(&[("minAccessRole", "writer")]),
    )
    .await?;

    let calendars = list
        .get("items")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|c| {
            let id = c.get("id")?.as_str()?.to_string();
            let summary = c
                .get("summaryOverride")
                .or_else(|| c.get("summary"))
                .and_then(Value::as_str)
                .unwrap_or(&id)
                .to_string();
            Some((id, summary))
        })
        .collect();

    Ok(calendars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_events_url_escapes_calendar_id() {
        let url = events_url(
            "https://www.googleapis.com/calendar/v3",
            "team#work@group.calendar.google.com",
            None,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team%23work@group.calendar.google.com/events"
        );

        let url = events_url("https://www.googleapis.com/calendar/v3/", "primary", Some("abc")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/primary/events/abc"
        );
    }

    #[test]
    fn test_collect_page_skips_cancelled_and_caps() {
        let page = json!({
            "items": [
                { "id": "1", "status": "confirmed" },
                { "id": "2", "status": "cancelled" },
                { "id": "3", "status": "confirmed" },
                { "id": "4", "status": "tentative" }
            ]
        });

        let mut events = Vec::new();
        collect_page(&page, &mut events, 2);

        let ids: Vec<_> = events.iter().map(|e| e["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_collect_page_without_items() {
        let mut events = Vec::new();
        collect_page(&json!({ "kind": "calendar#events" }), &mut events, 10);
        assert!(events.is_empty());
    }
}
