//! daybook - Personal Time Tracker with Outlook Calendar Import
//!
//! daybook records time entries in one JSON file per calendar day and can
//! import meetings from an Outlook calendar into the same store without
//! duplicating them or touching manually tracked entries.
//!
//! ## Core Features
//!
//! - **Day-partitioned storage**: `YYYY/MM/DD.json` files written atomically
//! - **Manual timers**: start/stop with automatic midnight splitting
//! - **Outlook sign-in**: OAuth device-code flow with token refresh
//! - **Idempotent import**: events correlated by their calendar id
//!
//! ## Modules
//!
//! - [`store`]: Entry persistence
//! - [`auth`]: Device-code authentication and token storage
//! - [`calendar`]: Paginated calendar reads
//! - [`mapper`]: Event filtering and conversion
//! - [`sync`]: Merge of calendar events into the store
//! - [`timer`]: Manual start/stop
//! - [`config`]: Configuration management and parsing

pub mod atomic;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod error;
pub mod mapper;
pub mod model;
pub mod store;
pub mod sync;
pub mod timer;

pub use auth::{AccessTokenProvider, AuthClient, AuthSettings, Token};
pub use calendar::{CalendarFetcher, RemoteEvent};
pub use config::Config;
pub use error::{AuthError, Error, FetchError, MappingError, Result, StoreError};
pub use model::{DayFile, Entry, Source};
pub use store::EntryStore;
pub use sync::{EventOutcome, SyncEngine, SyncOptions, SyncSummary, SyncWindow};
