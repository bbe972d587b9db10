use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::models::Table;
use crate::repo::{LocalId, LocalStore, Row, SCHEMA_VERSION};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<Table, BTreeMap<LocalId, Row>>,
    next_ids: HashMap<Table, LocalId>,
}

/// In-memory LocalStore for testing and as a fallback when no disk is available.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalStore for MemoryStore {
    async fn insert(&self, table: Table, mut row: Row) -> Result<LocalId, StoreError> {
        let mut tables = self.tables();
        let next = tables.next_ids.entry(table).or_insert(1);
        let id = *next;
        *next += 1;
        row.id = id;
        tables.rows.entry(table).or_default().insert(id, row);
        Ok(id)
    }

    async fn get(&self, table: Table, id: LocalId) -> Result<Option<Row>, StoreError> {
        Ok(self
            .tables()
            .rows
            .get(&table)
            .and_then(|rows| rows.get(&id))
            .cloned())
    }

    async fn put(&self, table: Table, row: Row) -> Result<(), StoreError> {
        let mut tables = self.tables();
        match tables.rows.get_mut(&table).and_then(|rows| rows.get_mut(&row.id)) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(StoreError::NotFound { table, id: row.id }),
        }
    }

    async fn remove(&self, table: Table, id: LocalId) -> Result<bool, StoreError> {
        Ok(self
            .tables()
            .rows
            .get_mut(&table)
            .and_then(|rows| rows.remove(&id))
            .is_some())
    }

    async fn list(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        Ok(self
            .tables()
            .rows
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn schema_version(&self) -> Result<u32, StoreError> {
        Ok(SCHEMA_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Goal, Note, Task};
    use crate::repo::Repository;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let repo = Repository::new(MemoryStore::new());

        // Initially empty
        assert!(repo.list::<Task>().await.unwrap().is_empty());

        let first = repo.insert(Row::new(Task::new("first"), None)).await.unwrap();
        let second = repo.insert(Row::new(Task::new("second"), None)).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);

        let tasks = repo.list::<Task>().await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].data.title, "first");
        assert_eq!(tasks[1].data.title, "second");
    }

    #[tokio::test]
    async fn test_ids_are_per_table() {
        let repo = Repository::new(MemoryStore::new());

        let task = repo.insert(Row::new(Task::new("t"), None)).await.unwrap();
        let note = repo
            .insert(Row::new(
                Note {
                    title: "n".into(),
                    content: String::new(),
                },
                None,
            ))
            .await
            .unwrap();
        assert_eq!(task.id, 1);
        assert_eq!(note.id, 1);
    }

    #[tokio::test]
    async fn test_put_replaces_and_requires_existing_row() {
        let repo = Repository::new(MemoryStore::new());
        let mut row = repo.insert(Row::new(Task::new("draft"), None)).await.unwrap();

        row.data.title = "final".into();
        repo.put(row.clone()).await.unwrap();
        assert_eq!(repo.require::<Task>(row.id).await.unwrap().data.title, "final");

        row.id = 99;
        assert!(matches!(
            repo.put(row).await,
            Err(StoreError::NotFound { id: 99, .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_and_unsynced() {
        let repo = Repository::new(MemoryStore::new());
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let goal = Goal {
            text: "walk".into(),
            completed: false,
            goal_date: date,
        };

        let a = repo.insert(Row::new(goal.clone(), None)).await.unwrap();
        let mut b = repo.insert(Row::new(goal, None)).await.unwrap();
        b.mark_synced();
        repo.put(b).await.unwrap();

        let pending = repo.unsynced(Table::Goals).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);
        assert_eq!(
            repo.pending_counts().await.unwrap(),
            vec![(Table::Goals, 1)]
        );

        assert!(repo.remove::<Goal>(a.id).await.unwrap());
        assert!(!repo.remove::<Goal>(a.id).await.unwrap());
        assert!(repo.pending_counts().await.unwrap().is_empty());
    }
}
