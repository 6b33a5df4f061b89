//! App-level configuration for the Outlook provider.
//!
//! Azure app registration credentials stored at:
//!   ~/.config/calmirror/providers/outlook/app_config.toml

use std::path::{Path, PathBuf};

use calmirror_core::config::provider_dir;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use serde::{Deserialize, Serialize};

pub const PROVIDER: &str = "outlook";

const DEFAULT_REDIRECT_URI: &str = "http://localhost:8085/callback";
const DEFAULT_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com/common";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Login authority, e.g. `https://login.microsoftonline.com/<tenant>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

impl AppConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        AppConfig {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            api_base: None,
            authority: None,
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
                "Outlook credentials not found.\n\n\
                Create {} with:\n\n\
                client_id = \"your-application-id\"\n\
                client_secret = \"your-client-secret\"\n\n\
                Register an app at https://entra.microsoft.com with redirect URI {}.",
                path.display(),
                DEFAULT_REDIRECT_URI
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

    fn authority(&self) -> &str {
        self.authority
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY)
            .trim_end_matches('/')
    }

    pub fn auth_url(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority())
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_follow_authority() {
        let mut app = AppConfig::new("id", "secret");
        assert_eq!(
            app.token_url(),
            "https://login.microsoftonline.com/common/oauth2/v2.0/token"
        );

        app.authority = Some("https://login.microsoftonline.com/contoso.onmicrosoft.com/".into());
        assert_eq!(
            app.auth_url(),
            "https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/authorize"
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app_config.toml");
        std::fs::write(&path, "client_id = \"id\"\nclient_secret = \"secret\"\n").unwrap();

        let app = AppConfig::load_from(&path).unwrap();
        assert_eq!(app.client_secret, "secret");
        assert_eq!(app.api_base(), DEFAULT_API_BASE);
    }
}
