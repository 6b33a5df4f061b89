//! Core types for calmirror.
//!
//! This crate provides everything the CLI and the provider crates share:
//! - `Event` and `Recurrence`, the provider-neutral event model
//! - `serializer`, the per-field table that maps events onto a provider's wire format
//! - `adapter`, the `CalendarAdapter` contract every provider implements
//! - `sync`, the reconciliation engine that mirrors events between calendars

pub mod adapter;
pub mod config;
pub mod date_range;
pub mod error;
pub mod event;
pub mod memory;
pub mod serializer;
pub mod session;
pub mod sync;

pub use adapter::CalendarAdapter;
pub use error::{CalMirrorError, CalMirrorResult};
pub use event::*;
