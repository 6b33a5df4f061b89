//! Microsoft Outlook provider for calmirror.
//!
//! Talks to Microsoft Graph; provenance is a single-value extended property.

pub mod app_config;
pub mod auth;
pub mod calendar;
mod http;
pub mod remote_config;
pub mod serializer;
mod session;

pub use app_config::{AppConfig, PROVIDER};
pub use calendar::OutlookCalendar;
pub use remote_config::OutlookRemoteConfig;
pub use serializer::OUTLOOK_SERIALIZER;
