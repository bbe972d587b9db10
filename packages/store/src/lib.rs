pub mod cache;
pub mod calendar;
pub mod config;
pub mod error;
pub mod models;
pub mod repo;
pub mod summary;
pub mod sync;

mod memory;
pub use memory::MemoryStore;

#[cfg(not(target_arch = "wasm32"))]
mod file_store;
#[cfg(not(target_arch = "wasm32"))]
pub use file_store::FileStore;

#[cfg(all(target_arch = "wasm32", feature = "web"))]
mod idb;
#[cfg(all(target_arch = "wasm32", feature = "web"))]
pub use idb::IdbStore;

#[cfg(test)]
mod testing;

pub use cache::{AddOutcome, OfflineCache};
pub use calendar::{Accuracy, BsDate, CalendarError, Conversion, PatroDay};
pub use config::{CalendarConfig, DailyTrackConfig, SyncConfig};
pub use error::{CacheError, StoreError};
pub use models::{
    Bill, Completable, Entity, Expense, ExpenseCategory, Goal, Income, Note, Priority, Profile,
    Table, Task, ValidationError,
};
pub use repo::{LocalId, LocalStore, Repository, Row, SCHEMA_VERSION};
pub use summary::{DailyProgress, MonthRange, MonthlySummary, TaskBuckets};
pub use sync::{
    NetworkOutcome, NetworkStatus, Notice, Reconciler, RemoteStore, SkipReason, SyncReport,
    SyncService, TableReport, Transition,
};
