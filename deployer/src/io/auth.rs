//! Salesforce session creation, verification and refresh.
//!
//! A [`Session`] is an immutable value. Refreshing never mutates the current
//! session; it produces a new one that the caller passes on explicitly.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::io::config::{Credentials, PasswordGrant};

pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

const LOGIN_HOST: &str = "https://login.salesforce.com";
const SANDBOX_HOST: &str = "https://test.salesforce.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub instance_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    instance_url: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Token endpoint host for an org. Sandboxes authenticate against `test`.
pub fn token_host(instance_url: Option<&str>) -> &'static str {
    match instance_url.map(str::to_ascii_lowercase) {
        Some(url) if url.contains("sandbox") || url.contains("test") => SANDBOX_HOST,
        _ => LOGIN_HOST,
    }
}

/// Parse an OAuth token response body into a session.
pub fn parse_token_response(body: &str) -> Result<Session> {
    let parsed: TokenResponse = serde_json::from_str(body).context("parse token response")?;
    if let Some(error) = parsed.error {
        let description = parsed.error_description.unwrap_or_default();
        return Err(anyhow!("token request rejected: {error} {description}"));
    }
    match (parsed.access_token, parsed.instance_url) {
        (Some(access_token), Some(instance_url)) => Ok(Session {
            access_token,
            instance_url,
        }),
        _ => Err(anyhow!("token response missing access_token or instance_url")),
    }
}

pub struct Authenticator {
    client: Client,
    api_version: String,
}

impl Authenticator {
    pub fn new(api_version: &str) -> Result<Self> {
        let client = Client::builder().build().context("build HTTP client")?;
        Ok(Self {
            client,
            api_version: api_version.to_string(),
        })
    }

    /// Create the session a run starts with.
    pub fn login(&self, credentials: Credentials<'_>) -> Result<Session> {
        match credentials {
            Credentials::AccessToken {
                access_token,
                instance_url,
            } => Ok(Session {
                access_token: access_token.to_string(),
                instance_url: instance_url.to_string(),
            }),
            Credentials::Password {
                grant,
                instance_url,
            } => self.password_grant(&grant, instance_url),
        }
    }

    /// OAuth username-password flow. The password is sent with the security
    /// token appended.
    #[instrument(skip_all)]
    pub fn password_grant(&self, grant: &PasswordGrant<'_>, instance_url: Option<&str>) -> Result<Session> {
        let url = format!("{}/services/oauth2/token", token_host(instance_url));
        let password = format!("{}{}", grant.password, grant.security_token);
        let params = [
            ("grant_type", "password"),
            ("client_id", grant.consumer_key),
            ("client_secret", grant.consumer_secret),
            ("username", grant.username),
            ("password", password.as_str()),
        ];
        let response = self
            .client
            .post(&url)
            .form(&params)
            .timeout(TOKEN_TIMEOUT)
            .send()
            .with_context(|| format!("request token from {url}"))?;
        let status = response.status();
        let body = response.text().context("read token response")?;
        let session = parse_token_response(&body)
            .with_context(|| format!("token request failed with HTTP {}", status.as_u16()))?;
        info!(instance_url = %session.instance_url, "obtained access token");
        Ok(session)
    }

    /// Check the session against the org.
    ///
    /// Returns the same session when it works, or a freshly issued one when the
    /// org answered 401 and a password grant is configured.
    #[instrument(skip_all, fields(instance_url = %session.instance_url))]
    pub fn verify(&self, session: &Session, credentials: Credentials<'_>) -> Result<Session> {
        let url = format!(
            "{}/services/data/v{}/limits",
            session.instance_url.trim_end_matches('/'),
            self.api_version
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&session.access_token)
            .timeout(VERIFY_TIMEOUT)
            .send()
            .with_context(|| format!("verify session at {url}"))?;
        match response.status() {
            status if status.is_success() => Ok(session.clone()),
            StatusCode::UNAUTHORIZED => {
                warn!("session expired; refreshing");
                match credentials {
                    Credentials::Password { grant, .. } => {
                        self.password_grant(&grant, Some(session.instance_url.as_str()))
                    }
                    Credentials::AccessToken { .. } => Err(anyhow!(
                        "access token rejected (401) and no password grant is configured"
                    )),
                }
            }
            status => Err(anyhow!("session verification failed with HTTP {}", status.as_u16())),
        }
    }
}
