//! OAuth 2.0 authorization-code and refresh-token grants against the
//! provider's token endpoint.

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::{MailError, Result, provider_message};

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Send, read-only thread access (reply detection) and the address itself.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
];

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Present on code exchange, and on refresh only when the provider
    /// rotates it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(http: Client, config: OAuthConfig) -> Self {
        Self { http, config }
    }

    /// Consent URL asking for offline access, so the provider issues a
    /// refresh token. `state` comes back untouched on the callback.
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| MailError::InvalidResponse(format!("bad auth url: {}", e)))?;
        Ok(url.into())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        if refresh_token.is_empty() {
            return Err(MailError::Unauthorized("no refresh token on file".into()));
        }
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let resp = self.http.post(&self.config.token_url).form(form).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status.is_success() {
            debug!("Token endpoint answered {}", status);
            return serde_json::from_str(&body)
                .map_err(|e| MailError::InvalidResponse(format!("token response: {}", e)));
        }

        // invalid_grant / invalid_client mean the credential itself is dead
        if status == StatusCode::BAD_REQUEST {
            return Err(MailError::Unauthorized(provider_message(&body)));
        }
        Err(MailError::from_status(status, &body))
    }
}
