//! # Filesystem-backed local store
//!
//! [`FileStore`] is a [`LocalStore`] implementation that persists rows to the
//! local filesystem. It is used by the CLI and on desktop/mobile platforms to keep
//! offline data across restarts.
//!
//! ## Layout
//!
//! ```text
//! <base_dir>/
//! ├── meta.json          # {"schema_version": 2, "next_ids": {"tasks": 4, ...}}
//! ├── tasks.json         # [Row, Row, ...] in id order
//! ├── expenses.json
//! ├── income.json
//! ├── notes.json
//! ├── goals.json         # since schema version 2
//! └── bills.json
//! ```
//!
//! Every write replaces the whole table file. A process-local lock serialises
//! read-modify-write cycles between clones of the same store.
//!
//! ## Migrations
//!
//! [`FileStore::open`] upgrades older directories in place. Version 1 directories
//! have no `goals.json` and rows without failure bookkeeping; the upgrade creates
//! the missing table, rewrites every row with its defaults filled in, and rebuilds
//! the id counters from the highest id present.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::Table;
use crate::repo::{LocalId, LocalStore, Row, SCHEMA_VERSION};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Meta {
    schema_version: u32,
    #[serde(default)]
    next_ids: BTreeMap<Table, LocalId>,
}

/// Filesystem-backed LocalStore for desktop, mobile and CLI persistence.
#[derive(Clone, Debug)]
pub struct FileStore {
    base: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Open (creating or migrating as needed) the store rooted at `base`.
    pub fn open(base: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self {
            base: base.into(),
            lock: Arc::new(Mutex::new(())),
        };
        std::fs::create_dir_all(&store.base)?;
        store.migrate()?;
        Ok(store)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn meta_path(&self) -> PathBuf {
        self.base.join("meta.json")
    }

    fn table_path(&self, table: Table) -> PathBuf {
        self.base.join(format!("{}.json", table.name()))
    }

    fn read_meta(&self) -> Result<Option<Meta>, StoreError> {
        match std::fs::read(self.meta_path()) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_meta(&self, meta: &Meta) -> Result<(), StoreError> {
        std::fs::write(self.meta_path(), serde_json::to_vec_pretty(meta)?)?;
        Ok(())
    }

    fn read_table(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        match std::fs::read(self.table_path(table)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_table(&self, table: Table, rows: &[Row]) -> Result<(), StoreError> {
        std::fs::write(self.table_path(table), serde_json::to_vec_pretty(rows)?)?;
        Ok(())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let _guard = self.guard();
        let meta = match self.read_meta()? {
            Some(meta) => meta,
            None => {
                let meta = Meta {
                    schema_version: SCHEMA_VERSION,
                    next_ids: BTreeMap::new(),
                };
                self.write_meta(&meta)?;
                return Ok(());
            }
        };

        if meta.schema_version > SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found: meta.schema_version,
                supported: SCHEMA_VERSION,
            });
        }
        if meta.schema_version == SCHEMA_VERSION {
            return Ok(());
        }

        tracing::info!(
            from = meta.schema_version,
            to = SCHEMA_VERSION,
            base = %self.base.display(),
            "migrating local store"
        );

        let mut next_ids = BTreeMap::new();
        for table in Table::ALL {
            // Rows deserialize with defaults for fields older versions lacked,
            // so rewriting them is the whole upgrade.
            let rows = self.read_table(table)?;
            let next = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
            next_ids.insert(table, next);
            self.write_table(table, &rows)?;
        }

        self.write_meta(&Meta {
            schema_version: SCHEMA_VERSION,
            next_ids,
        })
    }
}

impl LocalStore for FileStore {
    async fn insert(&self, table: Table, mut row: Row) -> Result<LocalId, StoreError> {
        let _guard = self.guard();
        let mut meta = self.read_meta()?.unwrap_or_default();
        let mut rows = self.read_table(table)?;

        let next = meta.next_ids.entry(table).or_insert(1);
        let id = *next;
        *next += 1;
        row.id = id;
        rows.push(row);

        self.write_table(table, &rows)?;
        meta.schema_version = SCHEMA_VERSION;
        self.write_meta(&meta)?;
        Ok(id)
    }

    async fn get(&self, table: Table, id: LocalId) -> Result<Option<Row>, StoreError> {
        let _guard = self.guard();
        Ok(self.read_table(table)?.into_iter().find(|r| r.id == id))
    }

    async fn put(&self, table: Table, row: Row) -> Result<(), StoreError> {
        let _guard = self.guard();
        let mut rows = self.read_table(table)?;
        let Some(slot) = rows.iter_mut().find(|r| r.id == row.id) else {
            return Err(StoreError::NotFound { table, id: row.id });
        };
        *slot = row;
        self.write_table(table, &rows)
    }

    async fn remove(&self, table: Table, id: LocalId) -> Result<bool, StoreError> {
        let _guard = self.guard();
        let mut rows = self.read_table(table)?;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Ok(false);
        }
        self.write_table(table, &rows)?;
        Ok(true)
    }

    async fn list(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        let _guard = self.guard();
        self.read_table(table)
    }

    async fn schema_version(&self) -> Result<u32, StoreError> {
        let _guard = self.guard();
        Ok(self
            .read_meta()?
            .map(|m| m.schema_version)
            .unwrap_or(SCHEMA_VERSION))
    }
}
