//! # Sync — pushing unsynced local rows to the remote
//!
//! ## Pieces
//!
//! | Item | Role |
//! |------|------|
//! | [`RemoteStore`] | What the reconciler needs from the backend: an idempotent upsert keyed by a stable id, and a delete. Implemented by `api::BackendClient`. |
//! | [`NetworkStatus`] | Shared online flag. [`set_online`](NetworkStatus::set_online) reports the transition so callers can react to reconnects. |
//! | [`Reconciler`] | One reconciliation pass over every table in [`Table::ALL`] order. |
//! | [`SyncService`] | Owns an [`OfflineCache`], prevents overlapping passes, and turns network transitions into passes or notices. |
//! | [`SyncReport`] / [`Notice`] | Outcome of a pass and the user-facing message derived from it. |
//!
//! ## Matching by stable id
//!
//! A row gets its `remote_id` **before** the first remote write, and that id is
//! persisted locally before the call is made. The remote upsert is keyed by it,
//! so when the remote write succeeds but marking the row synced fails, the next
//! pass sends the same id again and the backend merges instead of duplicating.
//! Rows with identical content stay distinct because their ids differ.
//!
//! ## Failure policy
//!
//! Each row is pushed independently. A rejected row keeps `synced = false`, gets
//! its `sync_attempts` incremented and `last_error` set, and is logged at `warn`;
//! the pass moves on. Nothing is retried within a pass.
//!
//! ## Deferred rows
//!
//! Two cases leave a row queued without counting as a failure:
//!
//! - the row belongs to a different user than the one signed in; it waits for
//!   its owner to sign in again;
//! - the row was edited locally while its upsert was in flight. The stored row
//!   is re-read after the remote call and only marked synced if it still holds
//!   the pushed version, so the newer edit goes out on the next pass.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::cache::OfflineCache;
use crate::config::SyncConfig;
use crate::error::StoreError;
use crate::models::Table;
use crate::repo::{LocalStore, Repository, Row};

/// The remote side of the cache.
pub trait RemoteStore {
    type Error: std::error::Error + 'static;

    /// Insert the row, or merge it into the existing row with the same id.
    fn upsert(
        &self,
        table: Table,
        remote_id: Uuid,
        user_id: &str,
        data: &Value,
    ) -> impl Future<Output = Result<(), Self::Error>>;

    fn delete(
        &self,
        table: Table,
        remote_id: Uuid,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Network state change reported by [`NetworkStatus::set_online`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
    Unchanged,
}

/// Shared online/offline flag.
#[derive(Clone, Debug)]
pub struct NetworkStatus {
    online: Arc<AtomicBool>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) -> Transition {
        let was = self.online.swap(online, Ordering::SeqCst);
        match (was, online) {
            (false, true) => Transition::WentOnline,
            (true, false) => Transition::WentOffline,
            _ => Transition::Unchanged,
        }
    }
}

/// A short user-facing message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub destructive: bool,
}

impl Notice {
    fn new(title: &str, description: &str, destructive: bool) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            destructive,
        }
    }

    pub fn offline_mode() -> Self {
        Self::new(
            "Offline Mode",
            "You're now offline. Data will be saved locally.",
            false,
        )
    }

    pub fn sync_complete() -> Self {
        Self::new(
            "Sync Complete",
            "Your offline data has been synchronized.",
            false,
        )
    }

    pub fn sync_failed(failed: usize) -> Self {
        Self {
            title: "Sync Failed".to_string(),
            description: format!(
                "{failed} item(s) couldn't be synchronized. They stay queued for the next pass."
            ),
            destructive: true,
        }
    }
}

/// Why a pass did nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    SignedOut,
    Offline,
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableReport {
    pub pushed: usize,
    pub failed: usize,
    /// Left queued without a failure: owned by another user, or edited mid-push.
    pub deferred: usize,
}

/// Outcome of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub tables: BTreeMap<Table, TableReport>,
    pub skipped: Option<SkipReason>,
}

impl SyncReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            tables: BTreeMap::new(),
            skipped: Some(reason),
        }
    }

    pub fn pushed(&self) -> usize {
        self.tables.values().map(|t| t.pushed).sum()
    }

    pub fn failed(&self) -> usize {
        self.tables.values().map(|t| t.failed).sum()
    }

    pub fn deferred(&self) -> usize {
        self.tables.values().map(|t| t.deferred).sum()
    }

    pub fn table(&self, table: Table) -> TableReport {
        self.tables.get(&table).copied().unwrap_or_default()
    }

    /// The message to show for this pass, if any.
    pub fn notice(&self) -> Option<Notice> {
        if self.failed() > 0 {
            Some(Notice::sync_failed(self.failed()))
        } else if self.pushed() > 0 {
            Some(Notice::sync_complete())
        } else {
            None
        }
    }
}

/// Outcome of pushing a single row.
#[derive(Debug)]
pub(crate) enum PushOutcome<E> {
    Pushed(Row),
    Rejected(Row, E),
    /// The remote has an older version; the newer local edit stays queued.
    Superseded(Row),
    /// Owned by a user other than the signed-in one; not sent.
    NotOwned(Row),
}

/// One reconciliation pass over borrowed cache parts.
pub struct Reconciler<'a, S: LocalStore, R: RemoteStore> {
    repo: &'a Repository<S>,
    remote: &'a R,
    network: &'a NetworkStatus,
    user_id: Option<&'a str>,
}

impl<'a, S: LocalStore, R: RemoteStore> Reconciler<'a, S, R> {
    pub fn new(
        repo: &'a Repository<S>,
        remote: &'a R,
        network: &'a NetworkStatus,
        user_id: Option<&'a str>,
    ) -> Self {
        Self {
            repo,
            remote,
            network,
            user_id,
        }
    }

    /// Push every unsynced row once.
    pub async fn run_pass(&self) -> SyncReport {
        let Some(user_id) = self.user_id else {
            tracing::debug!("sync skipped: no signed-in user");
            return SyncReport::skipped(SkipReason::SignedOut);
        };
        if !self.network.is_online() {
            tracing::debug!("sync skipped: offline");
            return SyncReport::skipped(SkipReason::Offline);
        }

        let mut report = SyncReport::default();
        for table in Table::ALL {
            let rows = match self.repo.unsynced(table).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(%table, error = %e, "failed to read unsynced rows");
                    continue;
                }
            };
            if rows.is_empty() {
                continue;
            }

            tracing::info!(%table, pending = rows.len(), "syncing table");
            let entry = report.tables.entry(table).or_default();
            for row in rows {
                let id = row.id;
                match push_row(self.repo, self.remote, table, user_id, row).await {
                    Ok(PushOutcome::Pushed(_)) => entry.pushed += 1,
                    Ok(PushOutcome::Superseded(_)) => {
                        tracing::debug!(%table, id, "row changed during push, left queued");
                        entry.deferred += 1;
                    }
                    Ok(PushOutcome::NotOwned(row)) => {
                        tracing::debug!(%table, id, owner = ?row.user_id, "row owned by another user, left queued");
                        entry.deferred += 1;
                    }
                    Ok(PushOutcome::Rejected(row, e)) => {
                        tracing::warn!(
                            %table,
                            id,
                            attempts = row.sync_attempts,
                            error = %e,
                            "remote rejected row"
                        );
                        entry.failed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(%table, id, error = %e, "local store failed during sync");
                        entry.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            pushed = report.pushed(),
            failed = report.failed(),
            deferred = report.deferred(),
            "sync pass finished"
        );
        report
    }
}

/// Push one row: assign and persist its remote id if needed, upsert it, then
/// record the outcome on the row as it is stored after the remote call.
pub(crate) async fn push_row<S: LocalStore, R: RemoteStore>(
    repo: &Repository<S>,
    remote: &R,
    table: Table,
    user_id: &str,
    mut row: Row,
) -> Result<PushOutcome<R::Error>, StoreError> {
    if row.user_id.as_deref().is_some_and(|owner| owner != user_id) {
        return Ok(PushOutcome::NotOwned(row));
    }

    let store = repo.store();
    if row.remote_id.is_none() || row.user_id.is_none() {
        row.remote_id.get_or_insert_with(Uuid::new_v4);
        row.user_id.get_or_insert_with(|| user_id.to_string());
        store.put(table, row.clone()).await?;
    }
    let remote_id = row.remote_id.unwrap_or_else(Uuid::new_v4);

    let result = remote.upsert(table, remote_id, user_id, &row.data).await;

    // Deleted while in flight: nothing left to mark.
    let Some(mut current) = store.get(table, row.id).await? else {
        return Ok(match result {
            Ok(()) => {
                row.mark_synced();
                PushOutcome::Pushed(row)
            }
            Err(e) => {
                row.mark_failed(&e);
                PushOutcome::Rejected(row, e)
            }
        });
    };
    let unchanged = current.updated_at == row.updated_at && current.data == row.data;
    current.remote_id = row.remote_id;
    current.user_id = row.user_id;

    match result {
        Ok(()) if unchanged => {
            current.mark_synced();
            store.put(table, current.clone()).await?;
            Ok(PushOutcome::Pushed(current))
        }
        Ok(()) => {
            current.synced = false;
            store.put(table, current.clone()).await?;
            Ok(PushOutcome::Superseded(current))
        }
        Err(e) => {
            current.mark_failed(&e);
            store.put(table, current.clone()).await?;
            Ok(PushOutcome::Rejected(current, e))
        }
    }
}

/// What [`SyncService::on_network_change`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkOutcome {
    Reconciled(SyncReport),
    WentOffline(Notice),
    Unchanged,
}

/// Owns the cache and serialises reconciliation passes.
pub struct SyncService<S: LocalStore, R: RemoteStore> {
    cache: OfflineCache<S, R>,
    config: SyncConfig,
    in_progress: AtomicBool,
}

struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S: LocalStore, R: RemoteStore> SyncService<S, R> {
    pub fn new(cache: OfflineCache<S, R>, config: SyncConfig) -> Self {
        Self {
            cache,
            config,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &OfflineCache<S, R> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut OfflineCache<S, R> {
        &mut self.cache
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Run a pass unless one is already running.
    pub async fn sync_now(&self) -> SyncReport {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            return SyncReport::skipped(SkipReason::AlreadyRunning);
        }
        let _guard = PassGuard(&self.in_progress);
        self.cache.reconciler().run_pass().await
    }

    /// Record a connectivity change; a reconnect triggers a pass when enabled.
    pub async fn on_network_change(&self, online: bool) -> NetworkOutcome {
        match self.cache.network().set_online(online) {
            Transition::WentOnline if self.config.sync_on_reconnect => {
                tracing::info!("network back online, reconciling");
                NetworkOutcome::Reconciled(self.sync_now().await)
            }
            Transition::WentOffline => {
                tracing::info!("network went offline");
                NetworkOutcome::WentOffline(Notice::offline_mode())
            }
            _ => NetworkOutcome::Unchanged,
        }
    }
}
