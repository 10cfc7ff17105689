use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use url::Url;

use trendline_core::config::GoogleConfig;

pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// Tokens returned by the authorization-code exchange. Google only issues a
/// refresh token on consent with `access_type=offline`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Client credentials needed by the consent flow.
#[derive(Debug, Clone)]
pub struct ConsentClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl ConsentClient {
    /// Returns the names of the missing settings when the flow cannot run.
    pub fn from_config(config: &GoogleConfig) -> Result<Self, Vec<&'static str>> {
        match (
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
            config.redirect_uri.as_deref(),
        ) {
            (Some(id), Some(secret), Some(redirect)) => Ok(Self {
                client_id: id.to_string(),
                client_secret: secret.to_string(),
                redirect_uri: redirect.to_string(),
            }),
            (id, secret, redirect) => {
                let mut missing = Vec::new();
                if id.is_none() {
                    missing.push("GA_OAUTH_CLIENT_ID");
                }
                if secret.is_none() {
                    missing.push("GA_OAUTH_CLIENT_SECRET");
                }
                if redirect.is_none() {
                    missing.push("GA_OAUTH_REDIRECT_URI");
                }
                Err(missing)
            }
        }
    }

    /// Consent screen URL requesting offline access. `scopes` is a
    /// whitespace-separated list.
    pub fn consent_url(&self, scopes: &str) -> Result<Url> {
        let scope = scopes.split_whitespace().collect::<Vec<_>>().join(" ");
        Url::parse_with_params(
            AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .context("invalid consent URL")
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, http: &reqwest::Client, code: &str) -> Result<TokenResponse> {
        let resp = http
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .context("token exchange request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("token exchange failed ({status}): {body}");
        }
        resp.json().await.context("invalid token exchange response")
    }
}

/// Trade a stored refresh token for a short-lived access token.
/// A short-lived access token from the refresh grant.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: u64,
}

impl TryFrom<TokenResponse> for AccessToken {
    type Error = anyhow::Error;

    fn try_from(tokens: TokenResponse) -> Result<Self> {
        let token = tokens
            .access_token
            .ok_or_else(|| anyhow!("no access_token in refresh response"))?;
        Ok(Self {
            token,
            expires_in: tokens.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS),
        })
    }
}

pub async fn refresh_access_token(
    http: &reqwest::Client,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<AccessToken> {
    let resp = http
        .post(TOKEN_URL)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await
        .context("token refresh request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("token refresh failed ({status}): {body}");
    }
    let tokens: TokenResponse = resp.json().await.context("invalid token refresh response")?;
    AccessToken::try_from(tokens)
}
