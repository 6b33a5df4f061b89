//! Outlook-specific calendar parameters.

use calmirror_core::config::CalendarConfig;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlookRemoteConfig {
    pub outlook_account: String,
    /// None means the account's default calendar
    pub outlook_calendar_id: Option<String>,
}

impl OutlookRemoteConfig {
    pub fn new(account: impl Into<String>, calendar_id: Option<String>) -> Self {
        Self {
            outlook_account: account.into(),
            outlook_calendar_id: calendar_id,
        }
    }
}

impl TryFrom<&CalendarConfig> for OutlookRemoteConfig {
    type Error = CalMirrorError;

    fn try_from(calendar: &CalendarConfig) -> CalMirrorResult<Self> {
        let outlook_account = calendar.param("outlook_account")?.to_string();
        let outlook_calendar_id = calendar
            .param("outlook_calendar_id")
            .ok()
            .map(str::to_string);

        Ok(Self {
            outlook_account,
            outlook_calendar_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_calendar(params: serde_json::Value) -> CalendarConfig {
        CalendarConfig {
            name: "home".into(),
            provider: "outlook".into(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_calendar_id_is_optional() {
        let remote =
            OutlookRemoteConfig::try_from(&make_calendar(json!({ "outlook_account": "me@outlook.com" })))
                .unwrap();
        assert_eq!(remote, OutlookRemoteConfig::new("me@outlook.com", None));

        let remote = OutlookRemoteConfig::try_from(&make_calendar(json!({
            "outlook_account": "me@outlook.com",
            "outlook_calendar_id": "AAMkAD"
        })))
        .unwrap();
        assert_eq!(remote.outlook_calendar_id.as_deref(), Some("AAMkAD"));
    }

    #[test]
    fn test_account_is_required() {
        assert!(OutlookRemoteConfig::try_from(&make_calendar(json!({}))).is_err());
    }
}
