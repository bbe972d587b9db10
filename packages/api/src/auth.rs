//! Email/password sessions against the backend's auth endpoints.
//!
//! A [`Session`] is stored on the [`BackendClient`] after sign-in; every later
//! request is authorised with its access token instead of the anon key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::BackendClient;
use crate::error::ApiError;

/// The signed-in account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| now + Duration::seconds(self.expires_in));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

impl BackendClient {
    /// Create an account. Returns the new session, or `None` when the backend
    /// requires the email to be confirmed first.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Option<Session>, ApiError> {
        let body = json!({
            "email": email.trim(),
            "password": password,
            "data": { "full_name": full_name },
        });
        let response = self
            .request(reqwest::Method::POST, "/auth/v1/signup")
            .await
            .json(&body)
            .send()
            .await?;
        let value: Value = Self::check(response).await?.json().await?;

        if value.get("access_token").is_none() {
            tracing::info!("sign-up needs email confirmation");
            return Ok(None);
        }
        let session = serde_json::from_value::<TokenResponse>(value)?.into_session(Utc::now());
        self.set_session(Some(session.clone())).await;
        Ok(Some(session))
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ApiError> {
        let body = json!({ "email": email.trim(), "password": password });
        let session = self.token_grant("password", &body).await?;
        tracing::info!(user = %session.user.id, "signed in");
        Ok(session)
    }

    /// Exchange the stored refresh token for a fresh session.
    pub async fn refresh_session(&self) -> Result<Session, ApiError> {
        let refresh_token = self
            .session()
            .await
            .map(|s| s.refresh_token)
            .ok_or(ApiError::NotSignedIn)?;
        let body = json!({ "refresh_token": refresh_token });
        self.token_grant("refresh_token", &body).await
    }

    async fn token_grant(&self, grant_type: &str, body: &Value) -> Result<Session, ApiError> {
        let response = self
            .request(reqwest::Method::POST, "/auth/v1/token")
            .await
            .query(&[("grant_type", grant_type)])
            .json(body)
            .send()
            .await?;
        let token: TokenResponse = Self::check(response).await?.json().await?;
        let session = token.into_session(Utc::now());
        self.set_session(Some(session.clone())).await;
        Ok(session)
    }

    /// Revoke the session remotely and forget it locally. The local session is
    /// dropped even when the remote call fails.
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        if self.session().await.is_none() {
            return Ok(());
        }
        let result = self
            .request(reqwest::Method::POST, "/auth/v1/logout")
            .await
            .send()
            .await;
        self.set_session(None).await;
        Self::check(result?).await?;
        Ok(())
    }

    /// The user behind the current session, as the backend sees it.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.active_session().await?;
        let response = self
            .request(reqwest::Method::GET, "/auth/v1/user")
            .await
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// The stored session, refreshed first if it has expired.
    pub async fn active_session(&self) -> Result<Session, ApiError> {
        let session = self.session().await.ok_or(ApiError::NotSignedIn)?;
        if !session.is_expired(Utc::now()) {
            return Ok(session);
        }
        tracing::debug!("session expired, refreshing");
        self.refresh_session().await.map_err(|e| match e {
            ApiError::Backend { .. } => ApiError::SessionExpired,
            other => other,
        })
    }
}
