//! Offline-first persistence and synchronization for the FactoSheet client.
//!
//! Writes that cannot reach the server are queued in a local SQLite store and
//! replayed when connectivity returns, dropping a request after three failed
//! attempts. The same store memoizes values with a time-to-live and keeps
//! document captures taken while disconnected.

pub mod clock;
pub mod config;
pub mod encode;
pub mod error;
pub mod event;
pub mod manager;
pub mod model;
pub mod replay;
pub mod store;

pub use error::{OfflineError, Result};
pub use event::{Connectivity, NetworkEvent, Notice};
pub use manager::{ConnectionStatus, OfflineManager};
pub use replay::{HttpReplayer, Replayer};
pub use store::{OfflineStore, StoreLocation};
