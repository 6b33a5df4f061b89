//! Error types for calmirror.

use thiserror::Error;

use crate::serializer::Field;

/// Errors that can occur in calmirror operations.
#[derive(Error, Debug)]
pub enum CalMirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// A serializer was asked about a field missing from its table.
    #[error("The {provider} serializer has no mapping for field '{field}'")]
    UnsupportedField { provider: String, field: Field },

    /// An update/delete on the copy path hit an event without a provenance marker.
    #[error("Refusing to {operation} event {event_id}: it has no provenance marker")]
    ProvenanceMissing {
        operation: &'static str,
        event_id: String,
    },

    #[error("Invalid {provider} event payload: {reason}")]
    InvalidPayload { provider: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider request failed{}: {message}", status_suffix(.status))]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CalMirrorError {
    /// Map a non-success HTTP status and its body onto an error.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            404 => CalMirrorError::NotFound(body),
            401 | 403 => CalMirrorError::Auth(body),
            _ => CalMirrorError::Transport {
                status: Some(status),
                message: body,
            },
        }
    }

    pub fn invalid_payload(provider: &str, reason: impl Into<String>) -> Self {
        CalMirrorError::InvalidPayload {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CalMirrorError::NotFound(_))
    }
}

impl From<serde_json::Error> for CalMirrorError {
    fn from(e: serde_json::Error) -> Self {
        CalMirrorError::Serialization(e.to_string())
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Result type alias for calmirror operations.
pub type CalMirrorResult<T> = Result<T, CalMirrorError>;
