//! # Offline-first cache
//!
//! [`OfflineCache`] is what the views talk to. Every write lands in the local
//! store first; when the network is up and a user is signed in it is pushed to the
//! remote straight away, otherwise it waits for the next reconciliation pass.
//!
//! | Method | Offline | Online |
//! |--------|---------|--------|
//! | [`add`](OfflineCache::add) | stored with `synced = false` → [`AddOutcome::Queued`] | stored, pushed, marked synced → [`AddOutcome::Synced`]; a rejected push keeps the row queued with the reason |
//! | [`update`](OfflineCache::update) | replaced in place, `synced = false` | replaced, then pushed |
//! | [`delete`](OfflineCache::delete) | removed locally only | removed remotely first, then locally |
//!
//! Remote rejections during `add`/`update` are not errors: the row is kept and
//! the reconciler picks it up. Local failures are returned as [`StoreError`].
//!
//! Offline deletes of rows that already reached the remote are not propagated;
//! there are no tombstones.

use chrono::Utc;

use crate::error::{CacheError, StoreError};
use crate::models::{Completable, Entity, Table};
use crate::repo::{LocalId, LocalStore, Repository, Row};
use crate::sync::{push_row, NetworkStatus, PushOutcome, Reconciler, RemoteStore};

/// Result of [`OfflineCache::add`] and [`OfflineCache::update`].
#[derive(Clone, Debug, PartialEq)]
pub enum AddOutcome<T> {
    Synced(Row<T>),
    /// Stored locally only. `reason` is set when a push was attempted and rejected.
    Queued {
        row: Row<T>,
        reason: Option<String>,
    },
}

impl<T> AddOutcome<T> {
    pub fn row(&self) -> &Row<T> {
        match self {
            AddOutcome::Synced(row) | AddOutcome::Queued { row, .. } => row,
        }
    }

    pub fn into_row(self) -> Row<T> {
        match self {
            AddOutcome::Synced(row) | AddOutcome::Queued { row, .. } => row,
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, AddOutcome::Synced(_))
    }
}

/// Local-first cache over a [`LocalStore`] and a [`RemoteStore`].
pub struct OfflineCache<S: LocalStore, R: RemoteStore> {
    repo: Repository<S>,
    remote: R,
    network: NetworkStatus,
    user_id: Option<String>,
}

impl<S: LocalStore, R: RemoteStore> OfflineCache<S, R> {
    pub fn new(store: S, remote: R, network: NetworkStatus, user_id: Option<String>) -> Self {
        Self {
            repo: Repository::new(store),
            remote,
            network,
            user_id,
        }
    }

    pub fn repository(&self) -> &Repository<S> {
        &self.repo
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn network(&self) -> &NetworkStatus {
        &self.network
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Switch the signed-in user. Rows created from now on are owned by it.
    pub fn set_user(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
    }

    pub fn reconciler(&self) -> Reconciler<'_, S, R> {
        Reconciler::new(&self.repo, &self.remote, &self.network, self.user_id())
    }

    fn push_target(&self) -> Option<&str> {
        if self.network.is_online() {
            self.user_id()
        } else {
            None
        }
    }

    /// Store a new record, pushing it immediately when online.
    pub async fn add<T: Entity>(&self, record: T) -> Result<AddOutcome<T>, StoreError> {
        record.validate()?;
        let row = self
            .repo
            .insert(Row::new(record, self.user_id.clone()))
            .await?;
        tracing::debug!(table = %T::TABLE, id = row.id, "stored row locally");
        self.push_typed(row).await
    }

    /// Replace a record in place and mark it for sync.
    pub async fn update<T: Entity>(
        &self,
        id: LocalId,
        record: T,
    ) -> Result<AddOutcome<T>, StoreError> {
        record.validate()?;
        let mut row = self.repo.require::<T>(id).await?;
        row.data = record;
        row.updated_at = Utc::now();
        row.synced = false;
        self.repo.put(row.clone()).await?;
        self.push_typed(row).await
    }

    /// Toggle the completion flag of a task or goal.
    pub async fn set_completed<T: Entity + Completable>(
        &self,
        id: LocalId,
        completed: bool,
    ) -> Result<AddOutcome<T>, StoreError> {
        let mut record = self.repo.require::<T>(id).await?.data;
        record.set_completed(completed);
        self.update(id, record).await
    }

    async fn push_typed<T: Entity>(&self, row: Row<T>) -> Result<AddOutcome<T>, StoreError> {
        let Some(user_id) = self.push_target() else {
            return Ok(AddOutcome::Queued { row, reason: None });
        };

        match push_row(&self.repo, &self.remote, T::TABLE, user_id, row.encode()?).await? {
            PushOutcome::Pushed(row) => Ok(AddOutcome::Synced(row.decode()?)),
            PushOutcome::Rejected(row, e) => {
                tracing::warn!(table = %T::TABLE, id = row.id, error = %e, "push failed, row queued");
                Ok(AddOutcome::Queued {
                    row: row.decode()?,
                    reason: Some(e.to_string()),
                })
            }
            PushOutcome::Superseded(row) => Ok(AddOutcome::Queued {
                row: row.decode()?,
                reason: None,
            }),
            PushOutcome::NotOwned(row) => Ok(AddOutcome::Queued {
                row: row.decode()?,
                reason: Some("row belongs to another user".to_string()),
            }),
        }
    }

    /// Delete a record. Returns `false` when it did not exist.
    pub async fn delete<T: Entity>(&self, id: LocalId) -> Result<bool, CacheError<R::Error>> {
        let Some(row) = self.repo.get::<T>(id).await? else {
            return Ok(false);
        };

        match (row.remote_id, self.push_target()) {
            (Some(remote_id), Some(_)) => {
                self.remote
                    .delete(T::TABLE, remote_id)
                    .await
                    .map_err(CacheError::Remote)?;
            }
            (Some(_), None) if row.synced => {
                tracing::warn!(table = %T::TABLE, id, "deleting offline; remote copy is kept");
            }
            _ => {}
        }

        Ok(self.repo.remove::<T>(id).await?)
    }

    pub async fn get<T: Entity>(&self, id: LocalId) -> Result<Option<Row<T>>, StoreError> {
        self.repo.get(id).await
    }

    pub async fn list<T: Entity>(&self) -> Result<Vec<Row<T>>, StoreError> {
        self.repo.list().await
    }

    pub async fn records<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        self.repo.records().await
    }

    pub async fn unsynced(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        self.repo.unsynced(table).await
    }

    /// Unsynced rows across all tables.
    pub async fn pending_count(&self) -> Result<usize, StoreError> {
        Ok(self
            .repo
            .pending_counts()
            .await?
            .into_iter()
            .map(|(_, n)| n)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{Expense, Goal, Task, ValidationError};
    use crate::testing::MemoryRemote;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn cache(online: bool) -> OfflineCache<MemoryStore, MemoryRemote> {
        OfflineCache::new(
            MemoryStore::new(),
            MemoryRemote::new(),
            NetworkStatus::new(online),
            Some("user-1".into()),
        )
    }

    #[tokio::test]
    async fn test_add_offline_is_queued() {
        let cache = cache(false);
        let outcome = cache.add(Task::new("offline task")).await.unwrap();

        assert!(matches!(outcome, AddOutcome::Queued { reason: None, .. }));
        assert!(!outcome.row().synced);
        assert!(outcome.row().remote_id.is_none());
        assert_eq!(cache.remote().count(Table::Tasks), 0);
        assert_eq!(cache.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_online_pushes_and_marks_synced() {
        let cache = cache(true);
        let outcome = cache.add(Task::new("online task")).await.unwrap();

        assert!(outcome.is_synced());
        let row = outcome.row();
        let remote_id = row.remote_id.unwrap();
        let remote = cache.remote().row(Table::Tasks, remote_id).unwrap();
        assert_eq!(remote["title"], "online task");
        assert_eq!(remote["user_id"], "user-1");

        let stored = cache.get::<Task>(row.id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(cache.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_online_failure_keeps_row_queued() {
        let cache = cache(true);
        cache.remote().set_unreachable(true);

        let outcome = cache.add(Task::new("flaky")).await.unwrap();
        let AddOutcome::Queued { row, reason } = outcome else {
            panic!("expected queued row");
        };
        assert!(reason.unwrap().contains("unreachable"));
        assert!(!row.synced);
        assert_eq!(row.sync_attempts, 1);
        assert!(row.remote_id.is_some());
        assert_eq!(cache.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_record() {
        let cache = cache(true);
        let expense = Expense {
            amount: dec!(-3),
            category_id: "food".into(),
            description: None,
            expense_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        };
        assert!(matches!(
            cache.add(expense).await,
            Err(StoreError::Invalid(ValidationError::Negative("amount")))
        ));
        assert_eq!(cache.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_reuses_remote_id() {
        let cache = cache(true);
        let row = cache.add(Task::new("draft")).await.unwrap().into_row();
        let remote_id = row.remote_id.unwrap();

        let updated = cache.update(row.id, Task::new("final")).await.unwrap();
        assert!(updated.is_synced());
        assert_eq!(updated.row().remote_id, Some(remote_id));
        assert_eq!(cache.remote().count(Table::Tasks), 1);
        assert_eq!(cache.remote().row(Table::Tasks, remote_id).unwrap()["title"], "final");
    }

    #[tokio::test]
    async fn test_update_offline_marks_unsynced() {
        let cache = cache(true);
        let row = cache.add(Task::new("draft")).await.unwrap().into_row();
        cache.network().set_online(false);

        let updated = cache.update(row.id, Task::new("edited")).await.unwrap();
        assert!(!updated.is_synced());
        assert_eq!(cache.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_completed_toggles_goal() {
        let cache = cache(false);
        let goal = Goal {
            text: "read".into(),
            completed: false,
            goal_date: NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(),
        };
        let id = cache.add(goal).await.unwrap().row().id;

        let done = cache.set_completed::<Goal>(id, true).await.unwrap();
        assert!(done.row().data.completed);
        assert!(cache.get::<Goal>(id).await.unwrap().unwrap().data.completed);
    }

    #[tokio::test]
    async fn test_delete_online_removes_remote_copy() {
        let cache = cache(true);
        let row = cache.add(Task::new("gone")).await.unwrap().into_row();

        assert!(cache.delete::<Task>(row.id).await.unwrap());
        assert_eq!(cache.remote().count(Table::Tasks), 0);
        assert_eq!(cache.remote().deletes(), vec![(Table::Tasks, row.remote_id.unwrap())]);
        assert!(cache.get::<Task>(row.id).await.unwrap().is_none());
        assert!(!cache.delete::<Task>(row.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_remote_failure_keeps_local_row() {
        let cache = cache(true);
        let row = cache.add(Task::new("sticky")).await.unwrap().into_row();
        cache.remote().set_unreachable(true);

        assert!(matches!(
            cache.delete::<Task>(row.id).await,
            Err(CacheError::Remote(_))
        ));
        assert!(cache.get::<Task>(row.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_offline_is_local_only() {
        let cache = cache(true);
        let row = cache.add(Task::new("kept remotely")).await.unwrap().into_row();
        cache.network().set_online(false);

        assert!(cache.delete::<Task>(row.id).await.unwrap());
        assert_eq!(cache.remote().count(Table::Tasks), 1);
    }
}
