//! # IndexedDB local store — browser-side persistence
//!
//! [`IdbStore`] is the [`LocalStore`] implementation used on the **web platform**.
//! It persists rows into the browser's IndexedDB via the [`rexie`] crate, giving the
//! client an offline-capable copy of the user's data.
//!
//! ## Database schema
//!
//! A single IndexedDB database named `"DailyTrackOfflineDB"` (version 2) with one
//! object store per [`Table`] plus a `"meta"` store:
//!
//! | IndexedDB store | Key | Value |
//! |-----------------|-----|-------|
//! | `"tasks"`, `"expenses"`, `"income"`, `"notes"`, `"goals"`, `"bills"` | local id (number) | row serialised as a JSON string |
//! | `"meta"` | table name | next id for that table |
//!
//! Version 1 databases lack the `"goals"` store; opening at version 2 runs the
//! browser's upgrade path, which creates it. Rows written by version 1 read their
//! missing fields as defaults.
//!
//! ## Connection management
//!
//! `IdbStore` opens a fresh [`Rexie`] connection on every operation. `Rexie` does
//! not implement `Clone`, and the browser caches IndexedDB connections internally.

use rexie::{ObjectStore as RexieObjectStore, Rexie, TransactionMode};
use wasm_bindgen::JsValue;

use crate::error::StoreError;
use crate::models::Table;
use crate::repo::{LocalId, LocalStore, Row, SCHEMA_VERSION};

const DEFAULT_DB_NAME: &str = "DailyTrackOfflineDB";
const META_STORE: &str = "meta";

fn backend(e: rexie::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// IndexedDB-backed LocalStore for web platform.
///
/// Each instance is scoped to a database name. When a user id is provided the
/// database is named `"DailyTrackOfflineDB-<user_id>"` so accounts sharing a
/// browser never see each other's rows.
#[derive(Clone)]
pub struct IdbStore {
    db_name: String,
}

impl IdbStore {
    pub fn new() -> Self {
        Self::with_namespace(None)
    }

    pub fn with_namespace(namespace: Option<&str>) -> Self {
        let db_name = match namespace {
            Some(ns) => format!("{DEFAULT_DB_NAME}-{ns}"),
            None => DEFAULT_DB_NAME.to_string(),
        };
        Self { db_name }
    }

    async fn open_db(&self) -> Result<Rexie, StoreError> {
        let mut builder = Rexie::builder(&self.db_name).version(SCHEMA_VERSION);
        for table in Table::ALL {
            builder = builder.add_object_store(RexieObjectStore::new(table.name()));
        }
        builder
            .add_object_store(RexieObjectStore::new(META_STORE))
            .build()
            .await
            .map_err(backend)
    }

    fn id_key(id: LocalId) -> JsValue {
        JsValue::from_f64(id as f64)
    }

    fn encode(row: &Row) -> Result<JsValue, StoreError> {
        Ok(JsValue::from_str(&serde_json::to_string(row)?))
    }

    fn decode(value: JsValue) -> Result<Row, StoreError> {
        let text = value
            .as_string()
            .ok_or_else(|| StoreError::Backend("row is not a string".into()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Default for IdbStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for IdbStore {
    async fn insert(&self, table: Table, mut row: Row) -> Result<LocalId, StoreError> {
        let db = self.open_db().await?;
        let tx = db
            .transaction(&[table.name(), META_STORE], TransactionMode::ReadWrite)
            .map_err(backend)?;
        let meta = tx.store(META_STORE).map_err(backend)?;
        let rows = tx.store(table.name()).map_err(backend)?;

        let counter_key = JsValue::from_str(table.name());
        let id = match meta.get(counter_key.clone()).await.map_err(backend)? {
            Some(value) => value.as_f64().unwrap_or(1.0) as LocalId,
            None => 1,
        };
        row.id = id;

        rows.put(&Self::encode(&row)?, Some(&Self::id_key(id)))
            .await
            .map_err(backend)?;
        meta.put(&JsValue::from_f64((id + 1) as f64), Some(&counter_key))
            .await
            .map_err(backend)?;
        tx.done().await.map_err(backend)?;
        Ok(id)
    }

    async fn get(&self, table: Table, id: LocalId) -> Result<Option<Row>, StoreError> {
        let db = self.open_db().await?;
        let tx = db
            .transaction(&[table.name()], TransactionMode::ReadOnly)
            .map_err(backend)?;
        let store = tx.store(table.name()).map_err(backend)?;
        match store.get(Self::id_key(id)).await.map_err(backend)? {
            Some(value) => Ok(Some(Self::decode(value)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, table: Table, row: Row) -> Result<(), StoreError> {
        if self.get(table, row.id).await?.is_none() {
            return Err(StoreError::NotFound { table, id: row.id });
        }
        let db = self.open_db().await?;
        let tx = db
            .transaction(&[table.name()], TransactionMode::ReadWrite)
            .map_err(backend)?;
        let store = tx.store(table.name()).map_err(backend)?;
        store
            .put(&Self::encode(&row)?, Some(&Self::id_key(row.id)))
            .await
            .map_err(backend)?;
        tx.done().await.map_err(backend)
    }

    async fn remove(&self, table: Table, id: LocalId) -> Result<bool, StoreError> {
        if self.get(table, id).await?.is_none() {
            return Ok(false);
        }
        let db = self.open_db().await?;
        let tx = db
            .transaction(&[table.name()], TransactionMode::ReadWrite)
            .map_err(backend)?;
        let store = tx.store(table.name()).map_err(backend)?;
        store.delete(Self::id_key(id)).await.map_err(backend)?;
        tx.done().await.map_err(backend)?;
        Ok(true)
    }

    async fn list(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        let db = self.open_db().await?;
        let tx = db
            .transaction(&[table.name()], TransactionMode::ReadOnly)
            .map_err(backend)?;
        let store = tx.store(table.name()).map_err(backend)?;
        let entries = store
            .get_all(None, None, None, None)
            .await
            .map_err(backend)?;

        let mut rows = entries
            .into_iter()
            .map(|(_, value)| Self::decode(value))
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn schema_version(&self) -> Result<u32, StoreError> {
        Ok(SCHEMA_VERSION)
    }
}
