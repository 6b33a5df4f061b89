//! Apple iCloud Calendar provider for calmirror.
//!
//! Speaks CalDAV with an Apple ID and an app-specific password. Events
//! travel as iCalendar resources; provenance is an `X-` property on the
//! VEVENT.

pub mod caldav;
pub mod calendar;
pub mod credentials;
mod http;
pub mod ics;
pub mod remote_config;
pub mod serializer;

pub use calendar::ICloudCalendar;
pub use credentials::Credentials;
pub use remote_config::ICloudRemoteConfig;
pub use serializer::ICLOUD_SERIALIZER;

pub const PROVIDER: &str = "icloud";

/// Apple's public CalDAV entry point. Discovery redirects from here to the
/// account's own server.
pub const DEFAULT_SERVER_URL: &str = "https://caldav.icloud.com";
