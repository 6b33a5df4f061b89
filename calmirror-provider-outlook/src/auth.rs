//! OAuth 2.0 authorization-code flow against the Microsoft identity platform.

use calmirror_core::session::SessionData;
use calmirror_core::{CalMirrorError, CalMirrorResult};
use serde::Deserialize;
use url::Url;

use crate::app_config::AppConfig;
use crate::http::send_json;

/// `offline_access` is what gets us a refresh token.
pub const SCOPES: &[&str] = &["offline_access", "User.Read", "Calendars.ReadWrite"];

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

pub fn authorization_url(app: &AppConfig, state: &str) -> CalMirrorResult<Url> {
    let mut url = Url::parse(&app.auth_url())
        .map_err(|e| CalMirrorError::Config(format!("Invalid authority: {e}")))?;

    url.query_pairs_mut()
        .append_pair("client_id", &app.client_id)
        .append_pair("redirect_uri", app.redirect_uri())
        .append_pair("response_type", "code")
        .append_pair("response_mode", "query")
        .append_pair("scope", &SCOPES.join(" "))
        .append_pair("state", state);

    Ok(url)
}

pub async fn exchange_code(
    http: &reqwest::Client,
    app: &AppConfig,
    code: &str,
) -> CalMirrorResult<SessionData> {
    let scope = SCOPES.join(" ");
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("client_id", app.client_id.as_str()),
        ("client_secret", app.client_secret.as_str()),
        ("redirect_uri", app.redirect_uri()),
        ("scope", scope.as_str()),
    ];

    let tokens: TokenResponse = send_json(http.post(app.token_url()).form(&params)).await?;

    let refresh_token = tokens.refresh_token.ok_or_else(|| {
        CalMirrorError::Auth("Microsoft did not return a refresh token (is offline_access granted?)".into())
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
    let scope = SCOPES.join(" ");
    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", session.refresh_token.as_str()),
        ("client_id", app.client_id.as_str()),
        ("client_secret", app.client_secret.as_str()),
        ("scope", scope.as_str()),
    ];

    let tokens: TokenResponse = send_json(http.post(app.token_url()).form(&params)).await?;

    // Microsoft rotates refresh tokens; keep whichever is newest
    Ok(session.refreshed(tokens.access_token, tokens.refresh_token, tokens.expires_in))
}

/// The signed-in user's address.
pub async fn discover_account(
    http: &reqwest::Client,
    app: &AppConfig,
    access_token: &str,
) -> CalMirrorResult<String> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Me {
        mail: Option<String>,
        user_principal_name: Option<String>,
    }

    let url = format!("{}/me", app.api_base());
    let me: Me = send_json(http.get(url).bearer_auth(access_token)).await?;

    me.mail
        .or(me.user_principal_name)
        .ok_or_else(|| CalMirrorError::Auth("Could not determine the signed-in account".into()))
}
