use std::collections::HashMap;
use std::io::{self, Write};

use anyhow::{Context, Result};
use calmirror_core::session::TokenStore;
use calmirror_provider_google as google;
use calmirror_provider_icloud as icloud;
use calmirror_provider_outlook as outlook;
use owo_colors::OwoColorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

use crate::utils::tui;

const DEFAULT_REDIRECT_PORT: u16 = 8085;

/// What the provider told us once the account was connected.
struct Connected {
    account: String,
    /// Writable calendars as `(id, name)`
    calendars: Vec<(String, String)>,
}

pub async fn run(provider: &str) -> Result<()> {
    println!("Connecting to {provider}...\n");

    let http = reqwest::Client::new();
    let state = uuid::Uuid::new_v4().to_string();

    let connected = match provider {
        google::PROVIDER => {
            let app = google::AppConfig::load().context("Failed to load Google app credentials")?;
            let url = google::auth::authorization_url(&app, &state)?;
            let code = authorize(&url, app.redirect_uri(), &state).await?;

            let spinner = tui::create_spinner("Exchanging code for tokens".to_string());
            let session = google::auth::exchange_code(&http, &app, &code).await;
            spinner.finish_and_clear();
            let session = session?;

            let account = google::auth::discover_account(&http, &app, &session.access_token).await?;
            let calendars =
                google::calendar::list_writable_calendars(&http, &app, &session.access_token).await?;
            TokenStore::for_provider(provider)?.save(&account, &session)?;
            Connected { account, calendars }
        }
        outlook::PROVIDER => {
            let app = outlook::AppConfig::load().context("Failed to load Outlook app credentials")?;
            let url = outlook::auth::authorization_url(&app, &state)?;
            let code = authorize(&url, app.redirect_uri(), &state).await?;

            let spinner = tui::create_spinner("Exchanging code for tokens".to_string());
            let session = outlook::auth::exchange_code(&http, &app, &code).await;
            spinner.finish_and_clear();
            let session = session?;

            let account =
                outlook::auth::discover_account(&http, &app, &session.access_token).await?;
            let calendars =
                outlook::calendar::list_writable_calendars(&http, &app, &session.access_token)
                    .await?;
            TokenStore::for_provider(provider)?.save(&account, &session)?;
            Connected { account, calendars }
        }
        icloud::PROVIDER => {
            println!("iCloud needs an app-specific password, create one at account.apple.com.\n");
            let apple_id = prompt_text("Apple ID")?;
            let password = prompt_password("App-specific password")?;
            let credentials = icloud::Credentials::new(apple_id, password);

            let spinner = tui::create_spinner("Finding calendars".to_string());
            let calendars = icloud::calendar::discover_calendars(&http, &credentials).await;
            spinner.finish_and_clear();
            let calendars = calendars?;

            credentials.save(&TokenStore::for_provider(provider)?)?;
            Connected {
                account: credentials.apple_id,
                calendars,
            }
        }
        other => anyhow::bail!("Unknown provider '{other}' (expected google, outlook or icloud)"),
    };

    println!("Authenticated as: {}\n", connected.account.green());

    if connected.calendars.is_empty() {
        println!("{}", "No writable calendars found.".dimmed());
        return Ok(());
    }

    println!("Add the calendars you want to mirror to your config.toml:\n");
    for (id, name) in &connected.calendars {
        println!("{}", calendar_snippet(provider, &connected.account, id, name));
    }

    Ok(())
}

/// Send the user to `url` and wait for the provider to redirect back with a code.
async fn authorize(url: &Url, redirect_uri: &str, state: &str) -> Result<String> {
    let port = Url::parse(redirect_uri)
        .context("Invalid redirect_uri")?
        .port_or_known_default()
        .unwrap_or(DEFAULT_REDIRECT_PORT);

    println!("Open this URL in your browser to authenticate:\n");
    println!("{}\n", url);

    if open::that(url.as_str()).is_err() {
        println!("(Could not open browser automatically, please copy the URL above)");
    }

    let params = wait_for_callback(port).await?;

    if let Some(error) = params.get("error") {
        let description = params.get("error_description").map(String::as_str).unwrap_or("");
        anyhow::bail!("Authorization was refused: {error} {description}");
    }

    let code = params
        .get("code")
        .ok_or_else(|| anyhow::anyhow!("No code in callback"))?;
    let returned_state = params
        .get("state")
        .ok_or_else(|| anyhow::anyhow!("No state in callback"))?;

    if returned_state != state {
        anyhow::bail!("OAuth state mismatch - possible CSRF attack");
    }

    Ok(code.clone())
}

/// Wait for an HTTP callback on localhost and return all query parameters.
async fn wait_for_callback(port: u16) -> Result<HashMap<String, String>> {
    let address = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&address)
        .await
        .context("Failed to bind OAuth callback listener")?;

    let (stream, _) = listener
        .accept()
        .await
        .context("Failed to accept OAuth callback")?;

    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .context("Failed to read OAuth callback request line")?;

    let params = parse_callback(&request_line)?;

    let response = "HTTP/1.1 200 OK\r\n\
        Content-Type: text/html\r\n\
        Connection: close\r\n\
        \r\n\
        <html><body>\
        <h1>calmirror is connected</h1>\
        <p>You can close this window and return to the terminal.</p>\
        </body></html>";

    let mut stream = reader.into_inner();
    stream
        .write_all(response.as_bytes())
        .await
        .context("Failed to write OAuth callback response")?;
    stream.flush().await?;

    Ok(params)
}

/// Query parameters from a request line like `GET /callback?code=x HTTP/1.1`.
fn parse_callback(request_line: &str) -> Result<HashMap<String, String>> {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("Invalid HTTP request"))?;

    let url = Url::parse(&format!("http://localhost{}", path))?;
    Ok(url.query_pairs().into_owned().collect())
}

/// Prompt the user for text input.
fn prompt_text(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().to_string())
}

/// Prompt the user for password input (hidden).
fn prompt_password(label: &str) -> Result<String> {
    let prompt = format!("{}: ", label);
    rpassword::prompt_password(&prompt).context("Failed to read password")
}

/// The config key that names a calendar of `provider`.
fn calendar_key(provider: &str) -> String {
    match provider {
        icloud::PROVIDER => "icloud_calendar_url".to_string(),
        other => format!("{other}_calendar_id"),
    }
}

fn calendar_snippet(
    provider: &str,
    account: &str,
    calendar_id: &str,
    calendar_name: &str,
) -> String {
    format!(
        "[[calendars]]\n\
        name = \"{}\"\n\
        provider = \"{provider}\"\n\
        {provider}_account = \"{account}\"\n\
        {} = \"{calendar_id}\"\n",
        config_name(calendar_name),
        calendar_key(provider)
    )
}

/// A short, config-friendly name: lowercase words joined by dashes.
fn config_name(display_name: &str) -> String {
    let lowered = display_name.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        "calendar".to_string()
    } else {
        words.join("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_extracts_query() {
        let params = parse_callback("GET /callback?code=4%2F0Ab&state=xyz HTTP/1.1\r\n").unwrap();
        assert_eq!(params["code"], "4/0Ab");
        assert_eq!(params["state"], "xyz");
    }

    #[test]
    fn test_parse_callback_rejects_garbage() {
        assert!(parse_callback("\r\n").is_err());
    }

    #[test]
    fn test_config_name() {
        assert_eq!(config_name("Work Calendar"), "work-calendar");
        assert_eq!(config_name("me@example.com"), "me-example-com");
        assert_eq!(config_name("  "), "calendar");
    }

    #[test]
    fn test_calendar_snippet_uses_provider_keys() {
        let snippet = calendar_snippet("outlook", "me@outlook.com", "AAMkAD", "Calendar");
        assert!(snippet.starts_with("[[calendars]]\n"));
        assert!(snippet.contains("name = \"calendar\""));
        assert!(snippet.contains("outlook_account = \"me@outlook.com\""));
        assert!(snippet.contains("outlook_calendar_id = \"AAMkAD\""));
    }

    #[test]
    fn test_icloud_snippet_names_the_collection_url() {
        let url = "https://p42-caldav.icloud.com/123/calendars/home/";
        let snippet = calendar_snippet("icloud", "me@icloud.com", url, "Home");
        assert!(snippet.contains("icloud_account = \"me@icloud.com\""));
        assert!(snippet.contains(&format!("icloud_calendar_url = \"{url}\"")));
        assert!(!snippet.contains("icloud_calendar_id"));
    }
}
