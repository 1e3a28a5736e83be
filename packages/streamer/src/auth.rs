//! Identity provider client.
//!
//! Exchanges the long-lived API key for a short-lived access token. The session
//! asks for a fresh token on every connection attempt.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default identity provider base URL
pub const DEFAULT_AUTH_URL: &str = "https://auth.streamingfast.io";

/// Path of the token issuance endpoint
pub const ISSUE_PATH: &str = "/v1/auth/issue";

/// Errors that can occur while acquiring a token
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Identity provider rejected the API key ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Identity provider returned an empty token")]
    EmptyToken,
}

/// Short-lived bearer credential
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AccessToken {
    token: String,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }

    /// Unix timestamp (seconds) after which the token is rejected, when known
    pub fn expires_at(&self) -> Option<i64> {
        self.expires_at
    }

    /// Value of the `authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of access tokens
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire_token(&self) -> Result<AccessToken, AuthError>;
}

#[derive(Serialize)]
struct IssueRequest<'a> {
    api_key: &'a str,
}

/// Issues tokens from an API key against the identity provider
pub struct ApiKeyTokenSource {
    http: reqwest::Client,
    auth_url: String,
    api_key: String,
}

impl ApiKeyTokenSource {
    pub fn new(auth_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: auth_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn issue_url(&self) -> String {
        format!("{}{}", self.auth_url.trim_end_matches('/'), ISSUE_PATH)
    }
}

#[async_trait]
impl TokenSource for ApiKeyTokenSource {
    async fn acquire_token(&self) -> Result<AccessToken, AuthError> {
        let response = self
            .http
            .post(self.issue_url())
            .json(&IssueRequest {
                api_key: &self.api_key,
            })
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

        let token: AccessToken = response.json().await?;
        if token.token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        tracing::debug!(expires_at = ?token.expires_at, "Acquired access token");
        Ok(token)
    }
}
