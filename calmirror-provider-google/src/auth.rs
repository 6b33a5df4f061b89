//! OAuth 2.0 authorization-code flow against Google.
//!
//! The CLI drives the browser and the redirect listener; this module only
//! builds URLs and talks to the token endpoint.

use calmirror_core::session::SessionData;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use serde::Deserialize;
use url::Url;

use crate::app_config::AppConfig;
use crate::http::send_json;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// Token endpoint response for both code exchange and refresh.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// The consent page the user is sent to.
pub fn authorization_url(app: &AppConfig, state: &str) -> CalMirrorResult<Url> {
    let mut url = Url::parse(app.auth_url())
        .map_err(|e| CalMirrorError::Config(format!("Invalid auth_url: {e}")))?;

    url.query_pairs_mut()
        .append_pair("client_id", &app.client_id)
        .append_pair("redirect_uri", app.redirect_uri())
        .append_pair("response_type", "code")
        .append_pair("scope", &SCOPES.join(" "))
        // Offline access plus forced consent so a refresh token is always issued
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", state);

    Ok(url)
}

/// Exchange the code from the redirect for a session.
pub async fn exchange_code(
    http: &reqwest::Client,
    app: &AppConfig,
    code: &str,
) -> CalMirrorResult<SessionData> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", app.client_id.as_str()),
        ("client_secret", app.client_secret.as_str()),
        ("redirect_uri", app.redirect_uri()),
    ];

    let tokens: TokenResponse = send_json(http.post(app.token_url()).form(&params)).await?;

    let refresh_token = tokens.refresh_token.ok_or_else(|| {
        CalMirrorError::Auth("Google did not return a refresh token".into())
    })?;

    Ok(SessionData::from_tokens(
        tokens.access_token,
        refresh_token,
        tokens.expires_in,
    ))
}

pub async fn refresh(
    http: &reqwest::Client,
    app: &AppConfig,
    session: &SessionData,
) -> CalMirrorResult<SessionData> {
    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", session.refresh_token.as_str()),
        ("client_id", app.client_id.as_str()),
        ("client_secret", app.client_secret.as_str()),
    ];

    let tokens: TokenResponse = send_json(http.post(app.token_url()).form(&params)).await?;

    Ok(session.refreshed(tokens.access_token, tokens.refresh_token, tokens.expires_in))
}

/// The account's email, which is also the id of its primary calendar.
pub async fn discover_account(
    http: &reqwest::Client,
    app: &AppConfig,
    access_token: &str,
) -> CalMirrorResult<String> {
    #[derive(Deserialize)]
    struct CalendarResource {
        id: String,
    }

    let url = format!("{}/calendars/primary", app.api_base());
    let primary: CalendarResource = send_json(http.get(url).bearer_auth(access_token)).await?;

    Ok(primary.id)
}
