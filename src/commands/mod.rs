pub mod auth;
pub mod calendars;
pub mod clean;
pub mod status;
pub mod sync;
