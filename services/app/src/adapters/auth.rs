//! services/app/src/adapters/auth.rs
//!
//! This module contains the adapter for the hosted auth service (Supabase GoTrue).
//! It implements the `AuthService` port from the `core` crate over its REST API
//! and keeps the current token pair in memory.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use meditect_core::domain::{AuthGrant, Principal, PrincipalMetadata, SessionTokens};
use meditect_core::ports::{AuthService, PortError, PortResult};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `AuthService` against a Supabase project.
pub struct SupabaseAuthAdapter {
    http: reqwest::Client,
    base_url: String,
    tokens: RwLock<Option<SessionTokens>>,
}

impl SupabaseAuthAdapter {
    /// Creates a new `SupabaseAuthAdapter`. Every request carries the project's
    /// anonymous key.
    pub fn new(base_url: &str, anon_key: &str, timeout: StdDuration) -> PortResult<Self> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(anon_key)
            .map_err(|_| PortError::Unexpected("Invalid anon key format".to_string()))?;
        headers.insert("apikey", key);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens: RwLock::new(None),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    async fn access_token(&self) -> Option<String> {
        self.tokens.read().await.as_ref().map(|t| t.access_token.clone())
    }

    /// Sends a request and decodes a JSON success body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> PortResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status, &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(format!("Malformed auth response: {}", e)))
    }

    /// Sends a request whose success body is irrelevant.
    async fn send_empty(&self, request: RequestBuilder) -> PortResult<()> {
        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status, &body));
        }
        Ok(())
    }

    async fn fetch_user(&self, access_token: &str) -> PortResult<Principal> {
        let user: GoTrueUser = self
            .send_json(self.http.get(self.auth_url("/user")).bearer_auth(access_token))
            .await?;
        Ok(user.into_principal())
    }

    async fn grant(&self, grant_type: &str, body: serde_json::Value) -> PortResult<AuthGrant> {
        let response: TokenResponse = self
            .send_json(
                self.http
                    .post(self.auth_url("/token"))
                    .query(&[("grant_type", grant_type)])
                    .json(&body),
            )
            .await?;
        let grant = response.into_grant(Utc::now())?;
        *self.tokens.write().await = Some(grant.tokens.clone());
        Ok(grant)
    }
}

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user_metadata: UserMetadata,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    name: Option<String>,
}

impl GoTrueUser {
    fn into_principal(self) -> Principal {
        Principal {
            id: self.id,
            email: self.email.filter(|e| !e.is_empty()),
            email_confirmed_at: self.email_confirmed_at,
            display_name: self.user_metadata.name,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: GoTrueUser,
}

impl TokenResponse {
    fn into_grant(self, now: DateTime<Utc>) -> PortResult<AuthGrant> {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                Duration::try_seconds(self.expires_in)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
            })
            .ok_or_else(|| {
                PortError::Unexpected(format!("Token lifetime out of range: {}", self.expires_in))
            })?;
        Ok(AuthGrant {
            principal: self.user.into_principal(),
            tokens: SessionTokens {
                access_token: self.access_token,
                refresh_token: self.refresh_token,
                expires_at,
            },
        })
    }
}

/// Sign-up answers with a bare user when confirmation is required and with a
/// full session when the project auto-confirms.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    WithSession { user: GoTrueUser },
    User(GoTrueUser),
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn error_from_response(status: StatusCode, body: &str) -> PortError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    if parsed.error_code.as_deref() == Some("email_not_confirmed") {
        return PortError::Unverified;
    }
    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    match status {
        StatusCode::UNAUTHORIZED => PortError::Unauthorized,
        StatusCode::NOT_FOUND => PortError::NotFound(message),
        StatusCode::CONFLICT => PortError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN | StatusCode::UNPROCESSABLE_ENTITY => {
            PortError::Rejected(message)
        }
        _ => PortError::Unexpected(format!("{}: {}", status.as_u16(), message)),
    }
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for SupabaseAuthAdapter {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthGrant> {
        self.grant("password", json!({ "email": email, "password": password }))
            .await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &PrincipalMetadata,
    ) -> PortResult<Principal> {
        let response: SignUpResponse = self
            .send_json(self.http.post(self.auth_url("/signup")).json(&json!({
                "email": email,
                "password": password,
                "data": { "name": metadata.name },
            })))
            .await?;

        // Any session handed out here is dropped.
        let user = match response {
            SignUpResponse::WithSession { user } => user,
            SignUpResponse::User(user) => user,
        };
        Ok(user.into_principal())
    }

    async fn sign_out(&self) -> PortResult<()> {
        let Some(access_token) = self.tokens.write().await.take().map(|t| t.access_token) else {
            debug!("sign-out without a session; nothing to revoke");
            return Ok(());
        };
        self.send_empty(
            self.http
                .post(self.auth_url("/logout"))
                .bearer_auth(access_token),
        )
        .await
    }

    async fn reset_password_for_email(&self, email: &str) -> PortResult<()> {
        self.send_empty(
            self.http
                .post(self.auth_url("/recover"))
                .json(&json!({ "email": email })),
        )
        .await
    }

    async fn current_principal(&self) -> PortResult<Option<Principal>> {
        let Some(access_token) = self.access_token().await else {
            return Ok(None);
        };
        match self.fetch_user(&access_token).await {
            Ok(principal) => Ok(Some(principal)),
            Err(PortError::Unauthorized) => {
                warn!("stored access token was rejected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> PortResult<AuthGrant> {
        self.grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn adopt_tokens(&self, tokens: &SessionTokens) {
        *self.tokens.write().await = Some(tokens.clone());
    }

    async fn discard_tokens(&self) {
        *self.tokens.write().await = None;
    }

    async fn verify_tokens(&self, tokens: &SessionTokens) -> PortResult<Principal> {
        self.fetch_user(&tokens.access_token).await
    }
}
