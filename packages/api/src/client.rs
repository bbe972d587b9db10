use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::auth::Session;
use crate::error::ApiError;
use crate::settings::Settings;

/// HTTP client for the hosted backend.
///
/// Cloning is cheap; clones share the HTTP connection pool and the session.
#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    bucket: String,
    signed_url_lifetime: Duration,
    session: Arc<RwLock<Option<Session>>>,
}

impl BackendClient {
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        if settings.backend.url.trim().is_empty() {
            return Err(ApiError::InvalidInput("backend url is empty".into()));
        }
        let http = reqwest::Client::builder()
            .user_agent("DailyTrack")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.backend.url.trim_end_matches('/').to_string(),
            anon_key: settings.backend.key.clone(),
            bucket: settings.storage.bucket.clone(),
            signed_url_lifetime: settings.storage.signed_url_lifetime(),
            session: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Storage bucket holding bill files.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn signed_url_lifetime(&self) -> Duration {
        self.signed_url_lifetime
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    pub async fn set_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    /// Id of the signed-in user, refreshing an expired session first.
    pub async fn require_user(&self) -> Result<String, ApiError> {
        Ok(self.active_session().await?.user.id)
    }

    /// A request to `path` carrying the anon key and the session token, or the
    /// anon key again when signed out.
    pub(crate) async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.anon_key.clone(),
        };
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }

    /// Turn a non-success response into [`ApiError::Backend`].
    pub(crate) async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        tracing::warn!(%status, %message, "backend request failed");
        Err(ApiError::Backend { status, message })
    }
}

/// Pull the human-readable message out of an error body. The auth, table,
/// storage and function endpoints each use a different field.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}
