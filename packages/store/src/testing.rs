//! Test doubles shared by the cache and sync tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use uuid::Uuid;

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::models::Table;
use crate::repo::{LocalId, LocalStore, Row};
use crate::sync::RemoteStore;

#[derive(Debug, thiserror::Error)]
#[error("remote failure: {0}")]
pub struct RemoteFailure(pub String);

#[derive(Debug, Default)]
struct RemoteState {
    rows: HashMap<(Table, Uuid), Value>,
    rejected_titles: HashSet<String>,
    unreachable: bool,
    deletes: Vec<(Table, Uuid)>,
    hold_upserts: bool,
    upserts_waiting: usize,
}

/// In-memory remote that can be told to reject rows or to park upserts.
#[derive(Clone, Debug, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, table: Table) -> usize {
        self.state
            .lock()
            .unwrap()
            .rows
            .keys()
            .filter(|(t, _)| *t == table)
            .count()
    }

    pub fn row(&self, table: Table, id: Uuid) -> Option<Value> {
        self.state.lock().unwrap().rows.get(&(table, id)).cloned()
    }

    pub fn deletes(&self) -> Vec<(Table, Uuid)> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn reject_title(&self, title: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_titles
            .insert(title.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    /// While held, every upsert waits (yielding) until released.
    pub fn hold_upserts(&self, hold: bool) {
        self.state.lock().unwrap().hold_upserts = hold;
    }

    pub fn upserts_waiting(&self) -> usize {
        self.state.lock().unwrap().upserts_waiting
    }

    fn is_held(&self) -> bool {
        self.state.lock().unwrap().hold_upserts
    }

    async fn wait_while_held(&self) {
        if !self.is_held() {
            return;
        }
        self.state.lock().unwrap().upserts_waiting += 1;
        while self.is_held() {
            tokio::task::yield_now().await;
        }
        self.state.lock().unwrap().upserts_waiting -= 1;
    }
}

impl RemoteStore for MemoryRemote {
    type Error = RemoteFailure;

    async fn upsert(
        &self,
        table: Table,
        remote_id: Uuid,
        user_id: &str,
        data: &Value,
    ) -> Result<(), RemoteFailure> {
        self.wait_while_held().await;
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(RemoteFailure("unreachable".into()));
        }
        if let Some(title) = data.get("title").and_then(Value::as_str) {
            if state.rejected_titles.contains(title) {
                return Err(RemoteFailure(format!("rejected {title}")));
            }
        }
        let mut stored = data.clone();
        if let Value::Object(map) = &mut stored {
            map.insert("id".into(), Value::String(remote_id.to_string()));
            map.insert("user_id".into(), Value::String(user_id.to_string()));
        }
        state.rows.insert((table, remote_id), stored);
        Ok(())
    }

    async fn delete(&self, table: Table, remote_id: Uuid) -> Result<(), RemoteFailure> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(RemoteFailure("unreachable".into()));
        }
        state.rows.remove(&(table, remote_id));
        state.deletes.push((table, remote_id));
        Ok(())
    }
}

/// MemoryStore whose `put` can be made to fail.
#[derive(Clone, Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    puts_left: Arc<Mutex<Option<usize>>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `n` more successful puts, then fail every put.
    pub fn fail_puts_after(&self, n: usize) {
        *self.puts_left.lock().unwrap() = Some(n);
    }

    pub fn heal(&self) {
        *self.puts_left.lock().unwrap() = None;
    }
}

impl LocalStore for FlakyStore {
    async fn insert(&self, table: Table, row: Row) -> Result<LocalId, StoreError> {
        self.inner.insert(table, row).await
    }

    async fn get(&self, table: Table, id: LocalId) -> Result<Option<Row>, StoreError> {
        self.inner.get(table, id).await
    }

    async fn put(&self, table: Table, row: Row) -> Result<(), StoreError> {
        {
            let mut left = self.puts_left.lock().unwrap();
            match left.as_mut() {
                Some(0) => return Err(StoreError::Backend("disk full".into())),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner.put(table, row).await
    }

    async fn remove(&self, table: Table, id: LocalId) -> Result<bool, StoreError> {
        self.inner.remove(table, id).await
    }

    async fn list(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        self.inner.list(table).await
    }

    async fn schema_version(&self) -> Result<u32, StoreError> {
        self.inner.schema_version().await
    }
}
