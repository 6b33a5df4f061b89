//! iCloud-specific calendar parameters.

use calmirror_core::config::CalendarConfig;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ICloudRemoteConfig {
    pub icloud_account: String,
    /// Absolute URL of the calendar collection, as `calmirror auth icloud` prints it
    pub icloud_calendar_url: String,
}

impl ICloudRemoteConfig {
    pub fn new(account: impl Into<String>, calendar_url: impl Into<String>) -> Self {
        Self {
            icloud_account: account.into(),
            icloud_calendar_url: calendar_url.into(),
        }
    }

    /// The collection URL, always with a trailing slash so hrefs resolve inside it.
    pub fn calendar_url(&self) -> CalMirrorResult<Url> {
        let raw = format!("{}/", self.icloud_calendar_url.trim_end_matches('/'));
        Url::parse(&raw).map_err(|e| {
            CalMirrorError::Config(format!(
                "Invalid icloud_calendar_url '{}': {e}",
                self.icloud_calendar_url
            ))
        })
    }
}

impl TryFrom<&CalendarConfig> for ICloudRemoteConfig {
    type Error = CalMirrorError;

    fn try_from(calendar: &CalendarConfig) -> CalMirrorResult<Self> {
        let remote = Self::new(
            calendar.param("icloud_account")?,
            calendar.param("icloud_calendar_url")?,
        );
        remote.calendar_url()?;
        Ok(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_calendar(params: serde_json::Value) -> CalendarConfig {
        CalendarConfig {
            name: "home".into(),
            provider: "icloud".into(),
            params: params.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_reads_account_and_calendar_url() {
        let calendar = make_calendar(json!({
            "icloud_account": "me@icloud.com",
            "icloud_calendar_url": "https://p42-caldav.icloud.com/123/calendars/home"
        }));
        let remote = ICloudRemoteConfig::try_from(&calendar).unwrap();

        assert_eq!(remote.icloud_account, "me@icloud.com");
        assert_eq!(
            remote.calendar_url().unwrap().as_str(),
            "https://p42-caldav.icloud.com/123/calendars/home/"
        );
    }

    #[test]
    fn test_both_keys_are_required() {
        let no_url = make_calendar(json!({ "icloud_account": "me" }));
        assert!(ICloudRemoteConfig::try_from(&no_url).is_err());

        let no_account = make_calendar(json!({ "icloud_calendar_url": "https://x/" }));
        assert!(ICloudRemoteConfig::try_from(&no_account).is_err());
    }

    #[test]
    fn test_calendar_url_must_parse() {
        let calendar = make_calendar(json!({
            "icloud_account": "me@icloud.com",
            "icloud_calendar_url": "not a url"
        }));
        assert!(matches!(
            ICloudRemoteConfig::try_from(&calendar),
            Err(CalMirrorError::Config(_))
        ));
    }
}
