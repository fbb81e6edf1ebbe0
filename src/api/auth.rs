//! Administrator gate in front of the enrichment endpoints.
//!
//! A bearer token is validated against the identity service, then the user
//! must hold the `admin` role in the record store. Requests that fail either
//! check are rejected before any enrichment work starts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::store::{RoleLookup, StoreError};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Unauthorized: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: administrator access required")]
    Forbidden,

    #[error("Identity service error: {0}")]
    IdentityService(String),

    #[error("Role lookup failed: {0}")]
    RoleLookup(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminUser {
    pub user_id: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait AdminGate: Send + Sync {
    async fn authorize(&self, token: Option<&str>) -> Result<AdminUser, AuthError>;
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

#[derive(Deserialize)]
struct IdentityUser {
    id: String,
    email: Option<String>,
}

/// Validates tokens with a hosted identity service (`GET /auth/v1/user`).
pub struct IdentityServiceGate {
    client: Client,
    identity_url: String,
    api_key: Option<String>,
    roles: Arc<dyn RoleLookup>,
}

impl IdentityServiceGate {
    pub fn new(
        identity_url: impl Into<String>,
        api_key: Option<String>,
        roles: Arc<dyn RoleLookup>,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::IdentityService(e.to_string()))?;

        Ok(Self {
            client,
            identity_url: identity_url.into().trim_end_matches('/').to_string(),
            api_key,
            roles,
        })
    }
}

#[async_trait]
impl AdminGate for IdentityServiceGate {
    async fn authorize(&self, token: Option<&str>) -> Result<AdminUser, AuthError> {
        let token = token.ok_or_else(|| AuthError::Unauthenticated("missing bearer token".into()))?;

        let mut request = self
            .client
            .get(format!("{}/auth/v1/user", self.identity_url))
            .bearer_auth(token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::IdentityService(e.to_string()))?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!(status = %status, "Token rejected by identity service");
            return Err(AuthError::Unauthenticated("invalid or expired token".into()));
        }
        if !status.is_success() {
            return Err(AuthError::IdentityService(format!("unexpected status {}", status)));
        }

        let user: IdentityUser = response
            .json()
            .await
            .map_err(|e| AuthError::IdentityService(e.to_string()))?;

        if !self.roles.has_role(&user.id, ADMIN_ROLE).await? {
            return Err(AuthError::Forbidden);
        }

        Ok(AdminUser {
            user_id: user.id,
            email: user.email,
        })
    }
}

/// Extractor that only succeeds for administrators.
pub struct RequireAdmin(pub AdminUser);

#[async_trait]
impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers);
        let user = state.auth.authorize(token).await?;
        Ok(RequireAdmin(user))
    }
}
