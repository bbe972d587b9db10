//! # Bill uploads
//!
//! Two ways to store a scanned bill:
//!
//! - [`BackendClient::invoke_upload_bill`] posts a multipart form to the
//!   `upload-bill` remote function, which does the work server-side.
//! - [`BackendClient::upload_bill`] does the same steps from the client: upload
//!   the file, insert the `bills` row, and remove the file again if the insert
//!   fails.
//!
//! Both follow the same rules. The object path is
//! `<user_id>/<millis>-<random>.<ext>`, a blank title falls back to the file
//! name, tags are split on `,` and trimmed, and an amount that does not parse is
//! stored as null.

use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use store::models::{Bill, Entity};

use crate::client::BackendClient;
use crate::error::ApiError;
use crate::tables::Record;

/// A bill file plus the optional form fields that come with it.
#[derive(Clone, Debug, Default)]
pub struct BillUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub title: Option<String>,
    pub amount: Option<String>,
    /// `YYYY-MM-DD`.
    pub bill_date: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
}

impl BillUpload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.amount = Some(amount.into());
        self
    }

    pub fn with_bill_date(mut self, date: impl Into<String>) -> Self {
        self.bill_date = Some(date.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    /// File extension as the object path uses it: everything after the last
    /// `.`, or the whole name when there is none.
    pub fn extension(&self) -> &str {
        self.file_name.rsplit('.').next().unwrap_or(&self.file_name)
    }

    /// The `bills` row for a file stored at `file_path`.
    pub fn to_bill(&self, file_path: String) -> Result<Bill, ApiError> {
        let title = match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.file_name.clone(),
        };
        let bill_date = match non_blank(self.bill_date.as_deref()) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| ApiError::InvalidInput(format!("invalid bill date: {raw}")))?,
            ),
            None => None,
        };
        let bill = Bill {
            title,
            file_path,
            file_type: non_blank(Some(&self.content_type)).map(str::to_string),
            amount: parse_amount(self.amount.as_deref()),
            bill_date,
            tags: parse_tags(self.tags.as_deref()),
        };
        bill.validate()
            .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
        Ok(bill)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Tags from a comma separated field; `None` when the field is blank.
pub fn parse_tags(raw: Option<&str>) -> Option<Vec<String>> {
    let raw = raw.filter(|r| !r.is_empty())?;
    Some(raw.split(',').map(|tag| tag.trim().to_string()).collect())
}

pub fn parse_amount(raw: Option<&str>) -> Option<Decimal> {
    let raw = non_blank(raw)?;
    match Decimal::from_str(raw) {
        Ok(amount) => Some(amount),
        Err(_) => {
            tracing::warn!(raw, "ignoring unparseable bill amount");
            None
        }
    }
}

/// `<user_id>/<millis>-<suffix>.<ext>`
pub fn object_path(user_id: &str, millis: i64, suffix: &str, ext: &str) -> String {
    format!("{user_id}/{millis}-{suffix}.{ext}")
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(11)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

#[derive(Deserialize)]
struct FunctionResponse {
    bill: Record<Bill>,
}

impl BackendClient {
    /// Upload through the `upload-bill` remote function.
    pub async fn invoke_upload_bill(&self, upload: &BillUpload) -> Result<Record<Bill>, ApiError> {
        self.active_session().await?;
        if upload.bytes.is_empty() {
            return Err(ApiError::InvalidInput("No file provided".into()));
        }

        let file = Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.content_type)?;
        let mut form = Form::new().part("file", file);
        for (name, value) in [
            ("title", &upload.title),
            ("amount", &upload.amount),
            ("billDate", &upload.bill_date),
            ("tags", &upload.tags),
        ] {
            if let Some(value) = value {
                form = form.text(name, value.clone());
            }
        }

        let response = self
            .request(Method::POST, "/functions/v1/upload-bill")
            .await
            .multipart(form)
            .send()
            .await?;
        let body: FunctionResponse = Self::check(response).await?.json().await?;
        tracing::info!(id = %body.bill.id, "bill uploaded");
        Ok(body.bill)
    }

    /// Upload the file and insert the row directly.
    pub async fn upload_bill(&self, upload: &BillUpload) -> Result<Record<Bill>, ApiError> {
        let user_id = self.require_user().await?;
        if upload.bytes.is_empty() {
            return Err(ApiError::InvalidInput("No file provided".into()));
        }

        let path = object_path(
            &user_id,
            Utc::now().timestamp_millis(),
            &random_suffix(),
            upload.extension(),
        );
        let bill = upload.to_bill(path.clone())?;

        let bucket = self.bucket().to_string();
        self.upload(&bucket, &path, upload.bytes.clone(), &upload.content_type)
            .await?;

        let mut row = serde_json::to_value(&bill)?;
        if let Value::Object(map) = &mut row {
            map.insert("user_id".into(), Value::String(user_id));
        }

        match self.insert::<_, Record<Bill>>("bills", &row).await {
            Ok(record) => {
                tracing::info!(id = %record.id, path, "bill uploaded");
                Ok(record)
            }
            Err(e) => {
                tracing::error!(error = %e, path, "bill insert failed, removing file");
                if let Err(cleanup) = self.remove(&bucket, &[path.clone()]).await {
                    tracing::warn!(error = %cleanup, path, "failed to remove orphaned bill file");
                }
                Err(e)
            }
        }
    }

    /// Signed download URL for a bill's file.
    pub async fn bill_url(&self, bill: &Bill) -> Result<String, ApiError> {
        self.create_signed_url(self.bucket(), &bill.file_path, self.signed_url_lifetime())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_title_falls_back_to_file_name() {
        let upload = BillUpload::new("receipt.jpg", "image/jpeg", vec![1]).with_title("  ");
        let bill = upload.to_bill("u/1-a.jpg".into()).unwrap();
        assert_eq!(bill.title, "receipt.jpg");
        assert_eq!(bill.file_type.as_deref(), Some("image/jpeg"));
        assert_eq!(bill.amount, None);
        assert_eq!(bill.tags, None);
    }

    #[test]
    fn test_fields_are_parsed() {
        let upload = BillUpload::new("r.png", "image/png", vec![1])
            .with_title("Groceries")
            .with_amount("12.50")
            .with_bill_date("2025-03-04")
            .with_tags(" food , weekly");
        let bill = upload.to_bill("p".into()).unwrap();
        assert_eq!(bill.title, "Groceries");
        assert_eq!(bill.amount, Some(dec!(12.50)));
        assert_eq!(bill.bill_date, NaiveDate::from_ymd_opt(2025, 3, 4));
        assert_eq!(bill.tags, Some(vec!["food".to_string(), "weekly".to_string()]));
    }

    #[test]
    fn test_bad_amount_is_null_and_bad_date_is_rejected() {
        assert_eq!(parse_amount(Some("abc")), None);
        assert_eq!(parse_amount(Some("")), None);
        let upload = BillUpload::new("r.png", "image/png", vec![1]).with_bill_date("04/03/2025");
        assert!(matches!(upload.to_bill("p".into()), Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_object_path_and_extension() {
        assert_eq!(BillUpload::new("scan.final.pdf", "", vec![]).extension(), "pdf");
        assert_eq!(BillUpload::new("scan", "", vec![]).extension(), "scan");
        assert_eq!(
            object_path("user-1", 1_700_000_000_000, "k3j9", "pdf"),
            "user-1/1700000000000-k3j9.pdf"
        );
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 11);
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_tags_keep_empty_entries_between_commas() {
        assert_eq!(parse_tags(Some("")), None);
        assert_eq!(
            parse_tags(Some("a,,b")),
            Some(vec!["a".to_string(), String::new(), "b".to_string()])
        );
    }
}
