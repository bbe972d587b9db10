//! # Repository — typed access to an abstract local store
//!
//! This module is the core of DailyTrack's local persistence. [`Repository`] gives
//! typed, per-entity access to rows kept by any [`LocalStore`], so the same logic
//! works against an in-memory store (tests), a directory of JSON files (desktop
//! and the CLI), or IndexedDB (browser).
//!
//! ## [`LocalStore`] trait
//!
//! An async interface over untyped rows, one logical table per [`Table`]:
//! `insert` assigns the next auto-increment id, `get`/`put`/`remove` address a row
//! by id, `list` returns a table in id order, and `schema_version` reports the
//! version the store was migrated to. Implementations live in sibling modules
//! ([`crate::memory`], [`crate::file_store`], `crate::idb`).
//!
//! ## Rows
//!
//! Every record is wrapped in a [`Row`] envelope that carries the sync metadata:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `id` | Local auto-increment id, unique per table. |
//! | `remote_id` | Stable id of the remote counterpart. Assigned before the first remote write and never changed. |
//! | `synced` | `true` once the current content is known to be on the remote. |
//! | `sync_attempts` / `last_error` | Failure bookkeeping for rows the remote rejected. |
//! | `user_id` | Owner the row will be written for. |
//! | `created_at` / `updated_at` | Local timestamps. |
//!
//! `Row<Value>` is the storage representation; [`Row::decode`] and [`Row::encode`]
//! convert to and from a typed `Row<T: Entity>`.
//!
//! ## Schema versions
//!
//! [`SCHEMA_VERSION`] is the version this build writes. Version 1 had no `goals`
//! table and no failure bookkeeping; both arrive in version 2 and old rows read
//! their missing fields as defaults.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Entity, Table};

/// Local auto-increment row id.
pub type LocalId = u64;

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// A record plus its local sync metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row<T = Value> {
    pub id: LocalId,
    #[serde(default)]
    pub remote_id: Option<Uuid>,
    pub synced: bool,
    #[serde(default)]
    pub sync_attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data: T,
}

impl<T> Row<T> {
    /// A fresh, unsynced row. The id is assigned by the store on insert.
    pub fn new(data: T, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            remote_id: None,
            synced: false,
            sync_attempts: 0,
            last_error: None,
            user_id,
            created_at: now,
            updated_at: now,
            data,
        }
    }

    /// Record a successful remote write.
    pub fn mark_synced(&mut self) {
        self.synced = true;
        self.last_error = None;
    }

    /// Record a rejected remote write.
    pub fn mark_failed(&mut self, error: impl ToString) {
        self.synced = false;
        self.sync_attempts += 1;
        self.last_error = Some(error.to_string());
    }
}

impl<T: Serialize> Row<T> {
    pub fn encode(self) -> Result<Row<Value>, StoreError> {
        Ok(Row {
            id: self.id,
            remote_id: self.remote_id,
            synced: self.synced,
            sync_attempts: self.sync_attempts,
            last_error: self.last_error,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            data: serde_json::to_value(self.data)?,
        })
    }
}

impl Row<Value> {
    pub fn decode<T: DeserializeOwned>(self) -> Result<Row<T>, StoreError> {
        Ok(Row {
            id: self.id,
            remote_id: self.remote_id,
            synced: self.synced,
            sync_attempts: self.sync_attempts,
            last_error: self.last_error,
            user_id: self.user_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            data: serde_json::from_value(self.data)?,
        })
    }
}

/// Async trait for storing and retrieving rows.
pub trait LocalStore {
    /// Insert a row, ignoring `row.id`, and return the id assigned to it.
    fn insert(
        &self,
        table: Table,
        row: Row,
    ) -> impl Future<Output = Result<LocalId, StoreError>>;
    fn get(
        &self,
        table: Table,
        id: LocalId,
    ) -> impl Future<Output = Result<Option<Row>, StoreError>>;
    /// Replace an existing row. Fails with [`StoreError::NotFound`] if it is gone.
    fn put(&self, table: Table, row: Row) -> impl Future<Output = Result<(), StoreError>>;
    /// Remove a row, returning whether it existed.
    fn remove(
        &self,
        table: Table,
        id: LocalId,
    ) -> impl Future<Output = Result<bool, StoreError>>;
    /// All rows of a table in id order.
    fn list(&self, table: Table) -> impl Future<Output = Result<Vec<Row>, StoreError>>;
    fn schema_version(&self) -> impl Future<Output = Result<u32, StoreError>>;
}

/// Typed access to a [`LocalStore`].
#[derive(Clone, Debug)]
pub struct Repository<S: LocalStore> {
    store: S,
}

impl<S: LocalStore> Repository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert a typed row and return it with its assigned id.
    pub async fn insert<T: Entity>(&self, mut row: Row<T>) -> Result<Row<T>, StoreError> {
        let encoded = row.clone().encode()?;
        row.id = self.store.insert(T::TABLE, encoded).await?;
        Ok(row)
    }

    pub async fn get<T: Entity>(&self, id: LocalId) -> Result<Option<Row<T>>, StoreError> {
        match self.store.get(T::TABLE, id).await? {
            Some(row) => Ok(Some(row.decode()?)),
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but a missing row is an error.
    pub async fn require<T: Entity>(&self, id: LocalId) -> Result<Row<T>, StoreError> {
        self.get(id).await?.ok_or(StoreError::NotFound {
            table: T::TABLE,
            id,
        })
    }

    pub async fn put<T: Entity>(&self, row: Row<T>) -> Result<(), StoreError> {
        self.store.put(T::TABLE, row.encode()?).await
    }

    pub async fn remove<T: Entity>(&self, id: LocalId) -> Result<bool, StoreError> {
        self.store.remove(T::TABLE, id).await
    }

    pub async fn list<T: Entity>(&self) -> Result<Vec<Row<T>>, StoreError> {
        self.store
            .list(T::TABLE)
            .await?
            .into_iter()
            .map(Row::decode)
            .collect()
    }

    /// Just the records, without their envelopes.
    pub async fn records<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.list::<T>().await?.into_iter().map(|r| r.data).collect())
    }

    /// Untyped rows of `table` still waiting for the remote.
    pub async fn unsynced(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .store
            .list(table)
            .await?
            .into_iter()
            .filter(|r| !r.synced)
            .collect())
    }

    /// Number of unsynced rows per table, skipping empty tables.
    pub async fn pending_counts(&self) -> Result<Vec<(Table, usize)>, StoreError> {
        let mut counts = Vec::new();
        for table in Table::ALL {
            let n = self.unsynced(table).await?.len();
            if n > 0 {
                counts.push((table, n));
            }
        }
        Ok(counts)
    }
}
