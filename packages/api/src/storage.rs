//! Object storage: bill files live under `/storage/v1/object/<bucket>/<path>`.

use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use crate::client::BackendClient;
use crate::error::ApiError;

#[derive(Deserialize)]
struct SignedUrl {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

impl BackendClient {
    /// Store `bytes` at `path` inside `bucket`. Fails if the object exists.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ApiError> {
        let response = self
            .request(Method::POST, &format!("/storage/v1/object/{bucket}/{path}"))
            .await
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;
        tracing::debug!(bucket, path, "uploaded object");
        Ok(path.to_string())
    }

    /// A time-limited download URL for a private object.
    pub async fn create_signed_url(
        &self,
        bucket: &str,
        path: &str,
        expires_in: Duration,
    ) -> Result<String, ApiError> {
        let response = self
            .request(Method::POST, &format!("/storage/v1/object/sign/{bucket}/{path}"))
            .await
            .json(&json!({ "expiresIn": expires_in.as_secs() }))
            .send()
            .await?;
        let signed: SignedUrl = Self::check(response).await?.json().await?;
        Ok(absolute_signed_url(self.base_url(), &signed.signed_url))
    }

    pub async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), ApiError> {
        let response = self
            .request(Method::DELETE, &format!("/storage/v1/object/{bucket}"))
            .await
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// The sign endpoint answers with a path relative to `/storage/v1`.
fn absolute_signed_url(base_url: &str, signed: &str) -> String {
    if signed.starts_with("http://") || signed.starts_with("https://") {
        return signed.to_string();
    }
    let signed = signed.trim_start_matches('/');
    format!("{base_url}/storage/v1/{signed}")
}
