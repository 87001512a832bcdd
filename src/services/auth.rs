//! Authentication lookups against the hosted auth service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Role value that grants access to the admin panel.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0} from auth service")]
    UnexpectedStatus(u16),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool { self.role.as_deref() == Some(ADMIN_ROLE) }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// The user behind `token`, or `None` when the token is missing, expired or revoked.
    async fn current_user(&self, token: &str) -> Result<Option<AuthUser>, AuthError>;
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Metadata,
    #[serde(default)]
    app_metadata: Metadata,
}

#[derive(Default, Deserialize)]
struct Metadata {
    full_name: Option<String>,
    name: Option<String>,
    role: Option<String>,
}

/// Talks to the hosted auth REST API (`/auth/v1/user`).
#[derive(Clone, Debug)]
pub struct SupabaseAuth {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuth {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, base_url: base_url.into(), anon_key: anon_key.into() })
    }
}

#[async_trait]
impl AuthService for SupabaseAuth {
    async fn current_user(&self, token: &str) -> Result<Option<AuthUser>, AuthError> {
        let response = self.client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => {
                let user: UserResponse = response.json().await?;
                Ok(Some(AuthUser {
                    id: user.id,
                    email: user.email,
                    full_name: user.user_metadata.full_name.or(user.user_metadata.name),
                    role: user.app_metadata.role.or(user.user_metadata.role),
                }))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("auth service rejected token");
                Ok(None)
            }
            other => Err(AuthError::UnexpectedStatus(other.as_u16())),
        }
    }
}

/// Pulls the access token from `Authorization: Bearer ..` or the session cookie.
pub fn extract_token(authorization: Option<&str>, cookie: Option<&str>) -> Option<String> {
    let bearer = authorization
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer { return Some(token.to_string()); }
    cookie?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "sb-access-token")
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}
