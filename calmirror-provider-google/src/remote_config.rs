//! Google-specific calendar parameters.
//!
//! Typed view over the provider keys of a `[[calendars]]` entry.

use calmirror_core::config::CalendarConfig;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleRemoteConfig {
    pub google_account: String,
    pub google_calendar_id: String,
}

impl GoogleRemoteConfig {
    pub fn new(account: impl Into<String>, calendar_id: impl Into<String>) -> Self {
        Self {
            google_account: account.into(),
            google_calendar_id: calendar_id.into(),
        }
    }
}

impl TryFrom<&CalendarConfig> for GoogleRemoteConfig {
    type Error = CalMirrorError;

    fn try_from(calendar: &CalendarConfig) -> CalMirrorResult<Self> {
        let google_account = calendar.param("google_account")?.to_string();

        // The account's own calendar when no id is given
        let google_calendar_id = calendar
            .param("google_calendar_id")
            .unwrap_or("primary")
            .to_string();

        Ok(Self {
            google_account,
            google_calendar_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_calendar(params: serde_json::Value) -> CalendarConfig {
        CalendarConfig {
            name: "work".into(),
            provider: "google".into(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_reads_account_and_calendar() {
        let calendar = make_calendar(json!({
            "google_account": "me@example.com",
            "google_calendar_id": "team@group.calendar.google.com"
        }));
        let remote = GoogleRemoteConfig::try_from(&calendar).unwrap();
        assert_eq!(
            remote,
            GoogleRemoteConfig::new("me@example.com", "team@group.calendar.google.com")
        );
    }

    #[test]
    fn test_calendar_id_defaults_to_primary() {
        let calendar = make_calendar(json!({ "google_account": "me@example.com" }));
        let remote = GoogleRemoteConfig::try_from(&calendar).unwrap();
        assert_eq!(remote.google_calendar_id, "primary");
    }

    #[test]
    fn test_account_is_required() {
        let calendar = make_calendar(json!({}));
        assert!(GoogleRemoteConfig::try_from(&calendar).is_err());
    }
}
