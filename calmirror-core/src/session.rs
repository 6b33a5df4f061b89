//! OAuth session persistence.
//!
//! One TOML file per (provider, account) under
//! `~/.config/calmirror/providers/<provider>/session/<account>.toml`.
//! OAuth providers keep `SessionData` there; providers with app passwords
//! keep their own credential struct through `save_as`/`load_as`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::provider_dir;
use crate::error::{CalMirrorError, CalMirrorResult};

/// Tokens for one authorized account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionData {
    pub fn from_tokens(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        SessionData {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    /// Expired, or about to expire within a minute.
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(60) >= self.expires_at
    }

    /// Fold a refresh response into this session.
    ///
    /// Providers usually omit the refresh token on refresh; the old one is kept then.
    pub fn refreshed(&self, access_token: String, refresh_token: Option<String>, expires_in: i64) -> Self {
        let refresh_token = refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.refresh_token.clone());
        SessionData::from_tokens(access_token, refresh_token, expires_in)
    }
}

/// Session files for one provider.
#[derive(Debug, Clone)]
pub struct TokenStore {
    root: PathBuf,
}

impl TokenStore {
    /// The default store for `provider`.
    pub fn for_provider(provider: &str) -> CalMirrorResult<Self> {
        Ok(TokenStore {
            root: provider_dir(provider)?.join("session"),
        })
    }

    /// A store rooted somewhere else.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        TokenStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, account: &str) -> PathBuf {
        let slug = account.replace(['/', '\\', ':'], "_");
        self.root.join(format!("{slug}.toml"))
    }

    pub fn has(&self, account: &str) -> bool {
        self.path(account).exists()
    }

    pub fn load(&self, account: &str) -> CalMirrorResult<SessionData> {
        self.load_as(account)
    }

    pub fn save(&self, account: &str, data: &SessionData) -> CalMirrorResult<()> {
        self.save_as(account, data)
    }

    /// Read any stored credential type for `account`.
    pub fn load_as<T: DeserializeOwned>(&self, account: &str) -> CalMirrorResult<T> {
        let path = self.path(account);

        if !path.exists() {
            return Err(CalMirrorError::Auth(format!(
                "No session for {account}. Run `calmirror auth` first."
            )));
        }

        let contents = std::fs::read_to_string(&path)?;
        toml::from_str(&contents).map_err(|e| {
            CalMirrorError::Config(format!("Failed to parse session {}: {e}", path.display()))
        })
    }

    pub fn save_as<T: Serialize>(&self, account: &str, data: &T) -> CalMirrorResult<()> {
        let contents = toml::to_string_pretty(data)
            .map_err(|e| CalMirrorError::Serialization(e.to_string()))?;

        let path = self.path(account);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = open_private(&path)?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;

        Ok(())
    }
}

/// Open `path` for writing, owner-only before anything is written to it.
fn open_private(path: &Path) -> CalMirrorResult<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        options.mode(0o600);
        let file = options.open(path)?;
        // `mode` only applies when the file is created
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        Ok(file)
    }

    #[cfg(not(unix))]
    {
        Ok(options.open(path)?)
    }
}
