//! Google Calendar provider for calmirror.
//!
//! Talks to the Calendar REST API directly so the provenance marker can be
//! kept in a private extended property.

pub mod app_config;
pub mod auth;
pub mod calendar;
mod http;
pub mod remote_config;
pub mod serializer;
mod session;

pub use app_config::{AppConfig, PROVIDER};
pub use calendar::GoogleCalendar;
pub use remote_config::GoogleRemoteConfig;
pub use serializer::GOOGLE_SERIALIZER;
