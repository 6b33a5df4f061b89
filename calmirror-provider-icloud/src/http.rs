//! Request plumbing for CalDAV.

use calmirror_core::{CalMirrorError, CalMirrorResult};
use reqwest::{Method, RequestBuilder, Response};

pub fn transport(e: reqwest::Error) -> CalMirrorError {
    CalMirrorError::Transport {
        status: e.status().map(|s| s.as_u16()),
        message: e.to_string(),
    }
}

/// A WebDAV extension method such as PROPFIND or REPORT.
pub fn dav_method(name: &'static str) -> CalMirrorResult<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|e| CalMirrorError::Transport {
        status: None,
        message: format!("{name}: {e}"),
    })
}

/// Send a request, turning any non-success status into an error.
///
/// 207 Multi-Status counts as success.
pub async fn send(request: RequestBuilder) -> CalMirrorResult<Response> {
    let response = request.send().await.map_err(transport)?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CalMirrorError::from_status(status.as_u16(), body));
    }

    Ok(response)
}

pub async fn send_text(request: RequestBuilder) -> CalMirrorResult<String> {
    send(request).await?.text().await.map_err(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dav_methods() {
        assert_eq!(dav_method("PROPFIND").unwrap().as_str(), "PROPFIND");
        assert_eq!(dav_method("REPORT").unwrap().as_str(), "REPORT");
        assert!(dav_method("NOT A METHOD").is_err());
    }
}
