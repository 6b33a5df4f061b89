//! Turning `[[calendars]]` entries into live adapters.

use anyhow::{Context, Result};
use calmirror_core::CalendarAdapter;
use calmirror_core::config::{CalendarConfig, MirrorConfig};
use calmirror_core::memory::MemoryCalendar;
use calmirror_core::session::TokenStore;
use calmirror_provider_google::{self as google, GoogleCalendar, GoogleRemoteConfig};
use calmirror_provider_icloud::{self as icloud, ICloudCalendar, ICloudRemoteConfig};
use calmirror_provider_outlook::{self as outlook, OutlookCalendar, OutlookRemoteConfig};
use tracing::debug;

/// In-process calendar that starts empty on every run. Handy for trying out a config.
pub const MEMORY_PROVIDER: &str = "memory";

pub fn open_calendar(calendar: &CalendarConfig) -> Result<Box<dyn CalendarAdapter>> {
    debug!(name = %calendar.name, provider = %calendar.provider, "Opening calendar");

    let adapter: Box<dyn CalendarAdapter> = match calendar.provider.as_str() {
        google::PROVIDER => {
            let app = google::AppConfig::load().with_context(|| {
                format!("Google app credentials are needed for calendar '{}'", calendar.name)
            })?;
            let remote = GoogleRemoteConfig::try_from(calendar)?;
            let store = TokenStore::for_provider(google::PROVIDER)?;
            Box::new(GoogleCalendar::new(&calendar.name, app, remote, store)?)
        }
        outlook::PROVIDER => {
            let app = outlook::AppConfig::load().with_context(|| {
                format!("Outlook app credentials are needed for calendar '{}'", calendar.name)
            })?;
            let remote = OutlookRemoteConfig::try_from(calendar)?;
            let store = TokenStore::for_provider(outlook::PROVIDER)?;
            Box::new(OutlookCalendar::new(&calendar.name, app, remote, store)?)
        }
        icloud::PROVIDER => {
            let remote = ICloudRemoteConfig::try_from(calendar)?;
            let store = TokenStore::for_provider(icloud::PROVIDER)?;
            let credentials = icloud::Credentials::load(&store, &remote.icloud_account)
                .with_context(|| {
                    format!("Run `calmirror auth icloud` for {}", remote.icloud_account)
                })?;
            Box::new(ICloudCalendar::new(&calendar.name, credentials, remote)?)
        }
        MEMORY_PROVIDER => Box::new(MemoryCalendar::new(&calendar.name)),
        other => anyhow::bail!(
            "Unknown provider '{}' for calendar '{}' (expected google, outlook, icloud or memory)",
            other,
            calendar.name
        ),
    };

    Ok(adapter)
}

/// Open every configured calendar, in config order.
pub fn open_all(config: &MirrorConfig) -> Result<Vec<Box<dyn CalendarAdapter>>> {
    config
        .calendars
        .iter()
        .map(|c| open_calendar(c).with_context(|| format!("Failed to open calendar '{}'", c.name)))
        .collect()
}

/// The config key naming the account a provider's calendars belong to.
pub fn account_key(provider: &str) -> Option<&'static str> {
    match provider {
        google::PROVIDER => Some("google_account"),
        outlook::PROVIDER => Some("outlook_account"),
        icloud::PROVIDER => Some("icloud_account"),
        _ => None,
    }
}

/// Whether a session is stored for the calendar's account. None for providers without sessions.
pub fn is_authenticated(calendar: &CalendarConfig) -> Result<Option<bool>> {
    let Some(key) = account_key(&calendar.provider) else {
        return Ok(None);
    };

    let account = calendar.param(key)?;
    let store = TokenStore::for_provider(&calendar.provider)?;
    Ok(Some(store.has(account)))
}
