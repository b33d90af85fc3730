use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OfflineError>;

/// Errors surfaced to callers of the offline layer.
///
/// Network failures during replay are not represented here: they are
/// absorbed into the pending request's retry count.
#[derive(Debug, Error)]
pub enum OfflineError {
  /// The store could not be opened or its schema could not be initialized.
  #[error("offline store unavailable: {0}")]
  StoreUnavailable(String),

  #[error("storage engine error: {0}")]
  Storage(#[from] rusqlite::Error),

  /// A stored row holds a value this version does not understand.
  #[error("corrupt record: {0}")]
  Corrupt(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// A captured file could not be turned into its textual form.
  #[error("failed to encode {}: {source}", path.display())]
  Encoding {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("configuration error: {0}")]
  Config(String),

  #[error("background task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}
