//! # Table access over the REST endpoint
//!
//! [`Query`] collects filters, ordering and a limit and renders them as query
//! string pairs (`user_id=eq.<id>`, `order=due_date.asc.nullslast`). The CRUD
//! methods on [`BackendClient`] send them to `/rest/v1/<table>`.
//!
//! Remote rows come back as [`Record<T>`]: the server-owned columns (`id`,
//! `user_id`, `created_at`) next to the flattened domain record.

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::client::BackendClient;
use crate::error::ApiError;

/// A row as stored remotely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: Uuid,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub data: T,
}

/// Filters and ordering for one table request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    table: String,
    select: String,
    filters: Vec<(String, String)>,
    order: Vec<String>,
    limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: "*".into(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Column list, including embedded relations such as `*,expense_categories(*)`.
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = columns.into();
        self
    }

    pub fn eq(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "eq", value)
    }

    pub fn gte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "gte", value)
    }

    pub fn lte(self, column: &str, value: impl ToString) -> Self {
        self.filter(column, "lte", value)
    }

    /// Case-insensitive pattern match; `%` is the wildcard.
    pub fn ilike(self, column: &str, pattern: impl ToString) -> Self {
        self.filter(column, "ilike", pattern)
    }

    fn filter(mut self, column: &str, op: &str, value: impl ToString) -> Self {
        self.filters
            .push((column.to_string(), format!("{op}.{}", value.to_string())));
        self
    }

    /// Add a sort key. Later calls break ties of earlier ones.
    pub fn order(mut self, column: &str, ascending: bool, nulls_last: bool) -> Self {
        let dir = if ascending { "asc" } else { "desc" };
        let nulls = if nulls_last { "nullslast" } else { "nullsfirst" };
        self.order.push(format!("{column}.{dir}.{nulls}"));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Query string pairs for a read.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.select.clone())];
        pairs.extend(self.filter_pairs());
        if !self.order.is_empty() {
            pairs.push(("order".into(), self.order.join(",")));
        }
        if let Some(n) = self.limit {
            pairs.push(("limit".into(), n.to_string()));
        }
        pairs
    }

    /// Only the filters, for updates and deletes.
    pub fn filter_pairs(&self) -> Vec<(String, String)> {
        self.filters.clone()
    }
}

fn table_path(table: &str) -> String {
    format!("/rest/v1/{table}")
}

impl BackendClient {
    pub async fn select<T: DeserializeOwned>(&self, query: &Query) -> Result<Vec<T>, ApiError> {
        let response = self
            .request(Method::GET, &table_path(query.table_name()))
            .await
            .query(&query.to_pairs())
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Insert one row and return what the backend stored.
    pub async fn insert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        row: &T,
    ) -> Result<R, ApiError> {
        let response = self
            .request(Method::POST, &table_path(table))
            .await
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let mut rows: Vec<R> = Self::check(response).await?.json().await?;
        rows.pop()
            .ok_or_else(|| ApiError::UnexpectedResponse(format!("insert into {table} returned no row")))
    }

    /// Insert the row, or merge it into the existing row with the same `id`.
    pub async fn upsert(&self, table: &str, row: &Value) -> Result<(), ApiError> {
        let response = self
            .request(Method::POST, &table_path(table))
            .await
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Patch every row matching `query`.
    pub async fn update(&self, query: &Query, patch: &Value) -> Result<(), ApiError> {
        let response = self
            .request(Method::PATCH, &table_path(query.table_name()))
            .await
            .query(&query.filter_pairs())
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Delete every row matching `query`. An unfiltered delete is refused.
    pub async fn delete(&self, query: &Query) -> Result<(), ApiError> {
        if query.filter_pairs().is_empty() {
            return Err(ApiError::InvalidInput(format!(
                "refusing unfiltered delete on {}",
                query.table_name()
            )));
        }
        let response = self
            .request(Method::DELETE, &table_path(query.table_name()))
            .await
            .query(&query.filter_pairs())
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
