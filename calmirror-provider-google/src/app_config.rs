//! App-level configuration for the Google provider.
//!
//! User-provided OAuth credentials stored at:
//!   ~/.config/calmirror/providers/google/app_config.toml

use std::path::{Path, PathBuf};

use calmirror_core::config::provider_dir;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use serde::{Deserialize, Serialize};

pub const PROVIDER: &str = "google";

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8085/callback";
const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth client credentials plus optional endpoint overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
}

impl AppConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        AppConfig {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            api_base: None,
            auth_url: None,
            token_url: None,
        }
    }

    pub fn path() -> CalMirrorResult<PathBuf> {
        Ok(provider_dir(PROVIDER)?.join("app_config.toml"))
    }

    pub fn load() -> CalMirrorResult<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> CalMirrorResult<Self> {
        if !path.exists() {
            return Err(CalMirrorError::Config(format!(
                "Google credentials not found.\n\n\
                Create {} with:\n\n\
                client_id = \"your-client-id.apps.googleusercontent.com\"\n\
                client_secret = \"your-client-secret\"\n\n\
                See https://console.cloud.google.com/apis/credentials for setup.",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            CalMirrorError::Config(format!(
                "Failed to parse credentials from {}: {e}",
                path.display()
            ))
        })
    }

    pub fn redirect_uri(&self) -> &str {
        self.redirect_uri.as_deref().unwrap_or(DEFAULT_REDIRECT_URI)
    }

    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }

    pub fn auth_url(&self) -> &str {
        self.auth_url.as_deref().unwrap_or(DEFAULT_AUTH_URL)
    }

    pub fn token_url(&self) -> &str {
        self.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_when_unset() {
        let app = AppConfig::new("id", "secret");
        assert_eq!(app.redirect_uri(), DEFAULT_REDIRECT_URI);
        assert_eq!(app.api_base(), DEFAULT_API_BASE);
        assert_eq!(app.token_url(), DEFAULT_TOKEN_URL);
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_config.toml");
        std::fs::write(
            &path,
            "client_id = \"id\"\nclient_secret = \"secret\"\napi_base = \"http://127.0.0.1:9000/v3/\"\n",
        )
        .unwrap();

        let app = AppConfig::load_from(&path).unwrap();
        assert_eq!(app.client_id, "id");
        assert_eq!(app.api_base(), "http://127.0.0.1:9000/v3");
    }

    #[test]
    fn test_missing_file_explains_setup() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("client_secret"));
    }
}
