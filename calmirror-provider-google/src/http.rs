//! Request plumbing shared by the adapter and the OAuth flow.

use calmirror_core::{CalMirrorError, CalMirrorResult};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

pub fn transport(e: reqwest::Error) -> CalMirrorError {
    CalMirrorError::Transport {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// Send a request, turning any non-success status into an error.
pub async fn send(request: RequestBuilder) -> CalMirrorResult<Response> {
    let response = request.send().await.map_err(transport)?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CalMirrorError::from_status(status.as_u16(), body));
    }

    Ok(response)
}

pub async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> CalMirrorResult<T> {
    send(request).await?.json().await.map_err(transport)
}
