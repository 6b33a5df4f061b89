//! Apple ID credentials.
//!
//! Kept in the shared token store under the Apple ID, at
//! `~/.config/calmirror/providers/icloud/session/<apple_id>.toml`, and
//! handed to `ICloudCalendar::new` by the caller.

use std::fmt;

use calmirror_core::CalMirrorResult;
use calmirror_core::session::TokenStore;
use serde::{Deserialize, Serialize};

use crate::DEFAULT_SERVER_URL;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub apple_id: String,
    /// App-specific password from account.apple.com, never the account password
    pub app_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
}

impl Credentials {
    pub fn new(apple_id: impl Into<String>, app_password: impl Into<String>) -> Self {
        Credentials {
            apple_id: apple_id.into(),
            app_password: app_password.into(),
            server_url: None,
        }
    }

    pub fn load(store: &TokenStore, apple_id: &str) -> CalMirrorResult<Self> {
        store.load_as(apple_id)
    }

    pub fn save(&self, store: &TokenStore) -> CalMirrorResult<()> {
        store.save_as(&self.apple_id, self)
    }

    pub fn server_url(&self) -> &str {
        self.server_url
            .as_deref()
            .unwrap_or(DEFAULT_SERVER_URL)
            .trim_end_matches('/')
    }

    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(&self.apple_id, Some(&self.app_password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("apple_id", &self.apple_id)
            .field("app_password", &"********")
            .field("server_url", &self.server_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::at(dir.path());
        let credentials = Credentials::new("me@icloud.com", "abcd-efgh-ijkl-mnop");

        credentials.save(&store).unwrap();
        assert!(store.has("me@icloud.com"));

        let loaded = Credentials::load(&store, "me@icloud.com").unwrap();
        assert_eq!(loaded, credentials);
        assert_eq!(loaded.server_url(), "https://caldav.icloud.com");
    }

    #[test]
    fn test_debug_hides_password() {
        let credentials = Credentials::new("me@icloud.com", "abcd-efgh-ijkl-mnop");
        let shown = format!("{credentials:?}");
        assert!(shown.contains("me@icloud.com"));
        assert!(!shown.contains("abcd"));
    }
}
