//! Spotify user authentication.
//!
//! A stored refresh token is exchanged for an access token at start-up. When Spotify rejects
//! it, the operator is walked through the authorization-code flow on the terminal and the new
//! refresh token is printed so it can be stored for later runs.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

pub const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const SCOPES: &str =
    "user-follow-read user-read-private playlist-read-private playlist-modify-private playlist-modify-public";

/// Application and user credentials, taken from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token endpoint returned status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("authorization url could not be built: {0}")]
    InvalidUrl(String),
    #[error("reading the authorization code failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("no authorization code was entered")]
    MissingCode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

fn http_client() -> Result<reqwest::Client, AuthError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?)
}

async fn request_token(
    client: &reqwest::Client,
    credentials: &Credentials,
    params: &HashMap<&str, &str>,
) -> Result<TokenResponse, AuthError> {
    let response = client
        .post(TOKEN_URL)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(params)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<TokenResponse>().await?)
}

/// Exchange the stored refresh token for a fresh access token.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    credentials: &Credentials,
) -> Result<TokenResponse, AuthError> {
    let mut params = HashMap::new();
    params.insert("grant_type", "refresh_token");
    params.insert("refresh_token", credentials.refresh_token.as_str());
    request_token(client, credentials, &params).await
}

/// Exchange an authorization code obtained through [`authorize_url`].
pub async fn exchange_code(
    client: &reqwest::Client,
    credentials: &Credentials,
    code: &str,
) -> Result<TokenResponse, AuthError> {
    let mut params = HashMap::new();
    params.insert("grant_type", "authorization_code");
    params.insert("code", code);
    params.insert("redirect_uri", credentials.redirect_uri.as_str());
    request_token(client, credentials, &params).await
}

/// The page the operator opens to grant access.
pub fn authorize_url(credentials: &Credentials) -> Result<String, AuthError> {
    let url = reqwest::Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("client_id", credentials.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("scope", SCOPES),
        ],
    )
    .map_err(|e| AuthError::InvalidUrl(e.to_string()))?;
    Ok(url.into())
}

/// Pull the `code` query parameter out of a pasted redirect url, or accept a bare code.
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match reqwest::Url::parse(input) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned()),
        Err(_) => Some(input.to_string()),
    }
}

async fn authorize_interactively(
    client: &reqwest::Client,
    credentials: &Credentials,
) -> Result<TokenResponse, AuthError> {
    let url = authorize_url(credentials)?;
    println!("Open this url in a browser and grant access:\n\n  {url}\n");
    println!("Paste the url you were redirected to (or just the code):");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let code = extract_code(&line).ok_or(AuthError::MissingCode)?;

    let token = exchange_code(client, credentials, &code).await?;
    match &token.refresh_token {
        Some(refresh_token) => {
            println!("New refresh token, store it as SPOTIFY_REFRESH_TOKEN:\n\n  {refresh_token}\n")
        }
        None => warn!("[AUTH] Authorization succeeded without a refresh token"),
    }
    Ok(token)
}

/// Obtain a user access token, falling back to the interactive flow when the refresh fails.
pub async fn authenticate(credentials: &Credentials) -> Result<String, AuthError> {
    let client = http_client()?;

    match refresh_access_token(&client, credentials).await {
        Ok(token) => {
            info!(expires_in = token.expires_in, "[AUTH] Access token refreshed");
            Ok(token.access_token)
        }
        Err(e) => {
            warn!(error = %e, "[AUTH] Refresh token rejected, starting interactive authorization");
            match authorize_interactively(&client, credentials).await {
                Ok(token) => {
                    info!(expires_in = token.expires_in, "[AUTH] Access token obtained interactively");
                    Ok(token.access_token)
                }
                Err(e) => {
                    error!(error = %e, "[AUTH] Interactive authorization failed");
                    Err(e)
                }
            }
        }
    }
}
