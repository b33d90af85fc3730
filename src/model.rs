//! Records owned by the offline store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A write that could not be confirmed by the server and awaits replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
  pub id: i64,
  /// Operation tag, e.g. "invoice_upload"
  pub kind: String,
  pub payload: Value,
  pub endpoint: String,
  /// Creation time in ms since the epoch
  pub timestamp: i64,
  pub retries: u32,
}

/// A memoized value with an absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub key: String,
  pub value: Value,
  pub timestamp: i64,
  pub expires: i64,
}

impl CacheEntry {
  /// An entry is still valid at its exact expiry instant.
  pub fn is_expired(&self, now_ms: i64) -> bool {
    now_ms > self.expires
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStatus {
  /// Captured while disconnected
  Offline,
}

impl ExtractionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      ExtractionStatus::Offline => "offline",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "offline" => Some(ExtractionStatus::Offline),
      _ => None,
    }
  }
}

/// A document capture recorded without network confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineExtraction {
  pub id: i64,
  pub filename: String,
  /// `data:` URL carrying the file bytes
  pub file_data: String,
  pub file_type: String,
  pub result: Option<Value>,
  pub timestamp: i64,
  pub status: ExtractionStatus,
  /// Written once at creation. Nothing flips it yet.
  pub synced: bool,
}

/// Fields of an extraction before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewExtraction {
  pub filename: String,
  pub file_data: String,
  pub file_type: String,
  pub result: Option<Value>,
  pub timestamp: i64,
}

/// In-memory capture handed to `record_offline_extraction`.
#[derive(Debug, Clone)]
pub struct CapturedFile {
  pub name: String,
  pub media_type: String,
  pub bytes: Vec<u8>,
}
