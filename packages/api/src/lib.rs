//! # API crate — client for the hosted DailyTrack backend
//!
//! Everything that talks to the network lives here. The `store` crate stays
//! free of HTTP; it only sees this crate through the [`store::RemoteStore`]
//! implementation on [`BackendClient`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`auth`] | Email/password sign-up and sign-in, token refresh, sign-out |
//! | [`bills`] | Bill uploads, either through the `upload-bill` function or directly |
//! | [`client`] | [`BackendClient`]: base URL, anon key, session, error mapping |
//! | [`lookups`] | Joined reads: expenses with categories, the bill behind an expense |
//! | [`settings`] | [`Settings`] loaded from defaults, `config.toml` and the environment |
//! | [`storage`] | Object upload, signed URLs, removal |
//! | [`tables`] | [`Query`] builder and table CRUD |
//!
//! Every request carries the anon key as `apikey`. The `Authorization` bearer is
//! the session's access token when signed in, otherwise the anon key.

pub mod auth;
pub mod bills;
pub mod client;
pub mod error;
pub mod lookups;
mod remote;
pub mod settings;
pub mod storage;
pub mod tables;

pub use auth::{Session, User};
pub use bills::BillUpload;
pub use client::BackendClient;
pub use error::ApiError;
pub use lookups::ExpenseWithCategory;
pub use remote::upsert_body;
pub use settings::Settings;
pub use tables::{Query, Record};
