//! The offline sync manager.
//!
//! Owns the connectivity flag and the store handle, and drives replay of
//! deferred writes. One instance is built at startup and shared by reference.

use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::config::DEFAULT_CACHE_TTL_MS;
use crate::encode;
use crate::error::{OfflineError, Result};
use crate::event::{Connectivity, NetworkEvent, Notice, BACKGROUND_SYNC_TAG};
use crate::model::{CacheEntry, CapturedFile, NewExtraction, OfflineExtraction, PendingRequest};
use crate::replay::Replayer;
use crate::store::OfflineStore;

/// Failed replays after which a pending request is dropped.
pub const MAX_REPLAY_ATTEMPTS: u32 = 3;

/// Snapshot returned by [`OfflineManager::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
  pub connectivity: Connectivity,
  pub pending: u64,
}

pub struct OfflineManager<R: Replayer> {
  store: OfflineStore,
  replayer: R,
  clock: Arc<dyn Clock>,
  online: AtomicBool,
  default_ttl_ms: i64,
  notices: Option<mpsc::UnboundedSender<Notice>>,
  /// Held for the duration of a replay pass
  sync_lock: Mutex<()>,
}

impl<R: Replayer> OfflineManager<R> {
  pub fn new(store: OfflineStore, replayer: R, initial: Connectivity) -> Self {
    Self {
      store,
      replayer,
      clock: Arc::new(SystemClock),
      online: AtomicBool::new(initial.is_online()),
      default_ttl_ms: DEFAULT_CACHE_TTL_MS,
      notices: None,
      sync_lock: Mutex::new(()),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_default_ttl(mut self, ttl_ms: i64) -> Self {
    self.default_ttl_ms = ttl_ms;
    self
  }

  /// Deliver user-facing notices on this channel.
  pub fn with_notices(mut self, tx: mpsc::UnboundedSender<Notice>) -> Self {
    self.notices = Some(tx);
    self
  }

  pub fn store(&self) -> &OfflineStore {
    &self.store
  }

  pub fn connectivity(&self) -> Connectivity {
    if self.online.load(Ordering::SeqCst) {
      Connectivity::Online
    } else {
      Connectivity::Offline
    }
  }

  pub async fn status(&self) -> Result<ConnectionStatus> {
    Ok(ConnectionStatus {
      connectivity: self.connectivity(),
      pending: self.store.count_pending().await?,
    })
  }

  fn notify(&self, notice: Notice) {
    tracing::info!(notice = ?notice.level, "{}", notice.message);
    if let Some(tx) = &self.notices {
      let _ = tx.send(notice);
    }
  }

  // ==========================================================================
  // Connectivity
  // ==========================================================================

  /// React to a network signal. Returns the number of requests replayed.
  pub async fn handle_event(&self, event: NetworkEvent) -> usize {
    match event {
      NetworkEvent::Online => {
        let was_online = self.online.swap(true, Ordering::SeqCst);
        if was_online {
          return 0;
        }
        tracing::info!("connection restored");
        self.notify(Notice::success("Connection restored"));
        self.synchronize().await
      }
      NetworkEvent::Offline => {
        let was_online = self.online.swap(false, Ordering::SeqCst);
        if was_online {
          tracing::info!("connection lost");
          self.notify(Notice::warning("Offline mode enabled"));
        }
        0
      }
      NetworkEvent::BackgroundSync { tag } => {
        if tag != BACKGROUND_SYNC_TAG {
          tracing::debug!(%tag, "ignoring unknown background sync tag");
          return 0;
        }
        tracing::info!("background sync requested");
        let _guard = self.sync_lock.lock().await;
        self.replay_pending().await
      }
    }
  }

  // ==========================================================================
  // Pending requests
  // ==========================================================================

  /// Queue a write for replay once the server is reachable.
  pub async fn enqueue(&self, kind: &str, payload: Value, endpoint: &str) -> Result<i64> {
    if kind.trim().is_empty() {
      return Err(OfflineError::InvalidRequest(
        "operation kind must not be empty".to_string(),
      ));
    }
    if endpoint.trim().is_empty() {
      return Err(OfflineError::InvalidRequest(
        "endpoint must not be empty".to_string(),
      ));
    }

    let id = self
      .store
      .insert_pending(kind, &payload, endpoint, self.clock.now_ms())
      .await?;
    tracing::info!(id, kind, endpoint, "saved request for later synchronization");
    Ok(id)
  }

  pub async fn list_pending(&self) -> Result<Vec<PendingRequest>> {
    self.store.pending().await
  }

  /// Replay every pending request once. Returns how many went through.
  ///
  /// Does nothing while offline. Concurrent calls run one after another,
  /// each over a fresh snapshot of the pending table.
  pub async fn synchronize(&self) -> usize {
    if !self.connectivity().is_online() {
      tracing::debug!("offline, skipping synchronization");
      return 0;
    }

    let _guard = self.sync_lock.lock().await;
    self.replay_pending().await
  }

  async fn replay_pending(&self) -> usize {
    let snapshot = match self.store.pending().await {
      Ok(snapshot) => snapshot,
      Err(e) => {
        tracing::warn!(error = %e, "cannot read pending requests");
        return 0;
      }
    };

    if snapshot.is_empty() {
      return 0;
    }
    tracing::info!(count = snapshot.len(), "synchronizing pending requests");

    let mut synced = 0;
    for request in snapshot {
      if self.replay_one(request).await {
        synced += 1;
      }
    }

    if synced > 0 {
      self.notify(Notice::success(format!("{} items synchronized", synced)));
    }

    synced
  }

  /// Replay one request and settle its record. True when the server took it.
  async fn replay_one(&self, request: PendingRequest) -> bool {
    match self
      .replayer
      .replay(&request.endpoint, &request.payload)
      .await
    {
      Ok(()) => {
        tracing::debug!(id = request.id, endpoint = %request.endpoint, "replayed");
        if let Err(e) = self.store.delete_pending(request.id).await {
          tracing::warn!(id = request.id, error = %e, "replayed request could not be removed");
        }
        true
      }
      Err(replay_err) => {
        let retries = request.retries.saturating_add(1);
        tracing::debug!(
          id = request.id,
          retries,
          error = %replay_err,
          "replay failed"
        );

        let settled = if retries >= MAX_REPLAY_ATTEMPTS {
          tracing::warn!(
            id = request.id,
            kind = %request.kind,
            endpoint = %request.endpoint,
            "dropping request after {} failed attempts",
            retries
          );
          self.store.delete_pending(request.id).await
        } else {
          self.store.update_pending_retries(request.id, retries).await
        };

        if let Err(e) = settled {
          tracing::warn!(id = request.id, error = %e, "failed to record replay failure");
        }
        false
      }
    }
  }

  // ==========================================================================
  // Cache
  // ==========================================================================

  /// Store `value` under `key` with the default time-to-live.
  pub async fn cache_write(&self, key: &str, value: Value) -> Result<()> {
    self
      .cache_write_with_ttl(key, value, self.default_ttl_ms)
      .await
  }

  pub async fn cache_write_with_ttl(&self, key: &str, value: Value, ttl_ms: i64) -> Result<()> {
    let now = self.clock.now_ms();
    let entry = CacheEntry {
      key: key.to_string(),
      value,
      timestamp: now,
      expires: now.saturating_add(ttl_ms),
    };
    self.store.put_cache(&entry).await
  }

  /// Read a cached value. Expired entries are removed and reported absent.
  pub async fn cache_read(&self, key: &str) -> Result<Option<Value>> {
    let entry = match self.store.get_cache(key).await? {
      Some(entry) => entry,
      None => return Ok(None),
    };

    if entry.is_expired(self.clock.now_ms()) {
      tracing::debug!(key, "cache entry expired");
      self.store.delete_cache(key).await?;
      return Ok(None);
    }

    Ok(Some(entry.value))
  }

  pub async fn cache_delete(&self, key: &str) -> Result<()> {
    self.store.delete_cache(key).await
  }

  // ==========================================================================
  // Offline extractions
  // ==========================================================================

  pub async fn record_offline_extraction(
    &self,
    file: CapturedFile,
    result: Option<Value>,
  ) -> Result<i64> {
    let CapturedFile {
      name,
      media_type,
      bytes,
    } = file;

    let file_type = media_type.clone();
    let file_data =
      tokio::task::spawn_blocking(move || encode::to_data_url(&media_type, &bytes)).await?;

    let id = self
      .store
      .insert_extraction(NewExtraction {
        filename: name,
        file_data,
        file_type,
        result,
        timestamp: self.clock.now_ms(),
      })
      .await?;
    tracing::info!(id, "extraction saved offline");
    Ok(id)
  }

  /// Read a capture from disk and record it.
  pub async fn record_offline_extraction_from_path(
    &self,
    path: &Path,
    result: Option<Value>,
  ) -> Result<i64> {
    let file = encode::read_captured_file(path).await?;
    self.record_offline_extraction(file, result).await
  }

  pub async fn list_extractions(&self) -> Result<Vec<OfflineExtraction>> {
    self.store.extractions().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::replay::ReplayError;
  use crate::store::unopenable_location;
  use serde_json::json;
  use std::collections::HashMap;
  use std::sync::Mutex as StdMutex;

  /// Records replay order; endpoints can be told to fail a number of times.
  #[derive(Default)]
  struct ScriptedReplayer {
    calls: StdMutex<Vec<(String, Value)>>,
    failures: StdMutex<HashMap<String, u32>>,
  }

  impl ScriptedReplayer {
    fn failing(endpoint: &str, times: u32) -> Self {
      let replayer = Self::default();
      replayer
        .failures
        .lock()
        .unwrap()
        .insert(endpoint.to_string(), times);
      replayer
    }

    fn endpoints(&self) -> Vec<String> {
      self
        .calls
        .lock()
        .unwrap()
        .iter()
        .map(|(e, _)| e.clone())
        .collect()
    }
  }

  impl Replayer for ScriptedReplayer {
    async fn replay(&self, endpoint: &str, payload: &Value) -> std::result::Result<(), ReplayError> {
      self
        .calls
        .lock()
        .unwrap()
        .push((endpoint.to_string(), payload.clone()));

      // Yield so concurrent passes can interleave
      tokio::task::yield_now().await;

      let mut failures = self.failures.lock().unwrap();
      match failures.get_mut(endpoint) {
        Some(remaining) if *remaining > 0 => {
          *remaining -= 1;
          Err(ReplayError::Status(503))
        }
        _ => Ok(()),
      }
    }
  }

  fn manager(replayer: ScriptedReplayer, initial: Connectivity) -> OfflineManager<ScriptedReplayer> {
    OfflineManager::new(OfflineStore::in_memory(), replayer, initial)
  }

  #[tokio::test]
  async fn test_enqueue_stores_exact_records() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Offline);

    let inputs = vec![
      ("invoice_upload", json!({"file": "a.pdf"}), "/api/upload"),
      ("invoice_update", json!([1, 2, 3]), "/api/invoices/7"),
      ("invoice_upload", json!(null), "/api/upload"),
    ];
    let mut ids = Vec::new();
    for (kind, payload, endpoint) in &inputs {
      ids.push(mgr.enqueue(kind, payload.clone(), endpoint).await.unwrap());
    }

    let pending = mgr.list_pending().await.unwrap();
    assert_eq!(pending.len(), inputs.len());
    for ((record, (kind, payload, endpoint)), id) in pending.iter().zip(&inputs).zip(&ids) {
      assert_eq!(record.id, *id);
      assert_eq!(record.kind, *kind);
      assert_eq!(&record.payload, payload);
      assert_eq!(record.endpoint, *endpoint);
      assert_eq!(record.retries, 0);
    }
  }

  #[tokio::test]
  async fn test_enqueue_rejects_empty_kind_and_endpoint() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online);

    let err = mgr.enqueue(" ", json!({}), "/api/upload").await.unwrap_err();
    assert!(matches!(err, OfflineError::InvalidRequest(_)));
    let err = mgr.enqueue("invoice_upload", json!({}), "").await.unwrap_err();
    assert!(matches!(err, OfflineError::InvalidRequest(_)));

    assert!(mgr.list_pending().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_offline_upload_replays_when_connection_returns() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Offline).with_notices(tx);

    mgr
      .enqueue("invoice_upload", json!({"file": "a.pdf"}), "/api/upload")
      .await
      .unwrap();
    let pending = mgr.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].retries, 0);

    assert_eq!(mgr.handle_event(NetworkEvent::Online).await, 1);

    assert_eq!(mgr.replayer.endpoints(), vec!["/api/upload"]);
    assert_eq!(
      mgr.replayer.calls.lock().unwrap()[0].1,
      json!({"file": "a.pdf"})
    );
    assert!(mgr.list_pending().await.unwrap().is_empty());

    assert_eq!(rx.recv().await, Some(Notice::success("Connection restored")));
    assert_eq!(rx.recv().await, Some(Notice::success("1 items synchronized")));
  }

  #[tokio::test]
  async fn test_synchronize_while_offline_is_noop() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Offline);
    mgr.enqueue("k", json!(1), "/api/a").await.unwrap();

    assert_eq!(mgr.synchronize().await, 0);
    assert!(mgr.replayer.endpoints().is_empty());
    assert_eq!(mgr.list_pending().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_replay_preserves_enqueue_order() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online);
    for endpoint in ["/api/a", "/api/b", "/api/c"] {
      mgr.enqueue("op", json!({}), endpoint).await.unwrap();
    }

    assert_eq!(mgr.synchronize().await, 3);
    assert_eq!(mgr.replayer.endpoints(), vec!["/api/a", "/api/b", "/api/c"]);
  }

  #[tokio::test]
  async fn test_request_dropped_after_three_failures() {
    let mgr = manager(
      ScriptedReplayer::failing("/api/down", u32::MAX),
      Connectivity::Online,
    );
    mgr.enqueue("op", json!({}), "/api/down").await.unwrap();

    assert_eq!(mgr.synchronize().await, 0);
    assert_eq!(mgr.list_pending().await.unwrap()[0].retries, 1);
    assert_eq!(mgr.synchronize().await, 0);
    assert_eq!(mgr.list_pending().await.unwrap()[0].retries, 2);
    assert_eq!(mgr.synchronize().await, 0);
    assert!(mgr.list_pending().await.unwrap().is_empty());

    // Nothing left to replay
    assert_eq!(mgr.synchronize().await, 0);
    assert_eq!(mgr.replayer.endpoints().len(), 3);
  }

  #[tokio::test]
  async fn test_third_attempt_success_is_counted() {
    let mgr = manager(
      ScriptedReplayer::failing("/api/flaky", 2),
      Connectivity::Online,
    );
    mgr.enqueue("op", json!({}), "/api/flaky").await.unwrap();

    assert_eq!(mgr.synchronize().await, 0);
    assert_eq!(mgr.synchronize().await, 0);
    assert_eq!(mgr.synchronize().await, 1);
    assert!(mgr.list_pending().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_failures_are_independent_per_record() {
    let mgr = manager(
      ScriptedReplayer::failing("/api/b", u32::MAX),
      Connectivity::Online,
    );
    for endpoint in ["/api/a", "/api/b", "/api/c"] {
      mgr.enqueue("op", json!({}), endpoint).await.unwrap();
    }

    assert_eq!(mgr.synchronize().await, 2);
    let pending = mgr.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].endpoint, "/api/b");
    assert_eq!(pending[0].retries, 1);
  }

  #[tokio::test]
  async fn test_no_record_outlives_retry_bound() {
    let mgr = manager(
      ScriptedReplayer::failing("/api/down", u32::MAX),
      Connectivity::Online,
    );
    mgr.enqueue("op", json!({}), "/api/down").await.unwrap();
    mgr.synchronize().await;
    mgr.enqueue("op", json!({}), "/api/down").await.unwrap();

    for _ in 0..5 {
      mgr.synchronize().await;
      let pending = mgr.list_pending().await.unwrap();
      assert!(
        pending.iter().all(|p| p.retries < MAX_REPLAY_ATTEMPTS),
        "record at the retry bound survived a pass: {:?}",
        pending
      );
    }
    assert!(mgr.list_pending().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_store_failure_mid_pass_continues_with_next_record() {
    let mgr = manager(
      ScriptedReplayer::failing("/api/b", u32::MAX),
      Connectivity::Online,
    );
    let a = mgr.enqueue("op", json!({}), "/api/a").await.unwrap();
    let b = mgr.enqueue("op", json!({}), "/api/b").await.unwrap();
    mgr.enqueue("op", json!({}), "/api/c").await.unwrap();

    // Refuse to delete A and to bump B's retry count
    mgr
      .store()
      .execute_batch(&format!(
        "CREATE TRIGGER keep_a BEFORE DELETE ON pending WHEN OLD.id = {a}
           BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;
         CREATE TRIGGER freeze_b BEFORE UPDATE ON pending WHEN OLD.id = {b}
           BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;"
      ))
      .await
      .unwrap();

    // A was taken by the server even though its record stays behind
    assert_eq!(mgr.synchronize().await, 2);
    assert_eq!(mgr.replayer.endpoints(), vec!["/api/a", "/api/b", "/api/c"]);

    let pending = mgr.list_pending().await.unwrap();
    let left: Vec<_> = pending.iter().map(|p| (p.id, p.retries)).collect();
    assert_eq!(left, vec![(a, 0), (b, 0)]);
  }

  #[tokio::test]
  async fn test_concurrent_passes_do_not_double_replay() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online);
    for endpoint in ["/api/a", "/api/b"] {
      mgr.enqueue("op", json!({}), endpoint).await.unwrap();
    }

    let (first, second) = tokio::join!(mgr.synchronize(), mgr.synchronize());
    assert_eq!(first + second, 2);
    assert_eq!(mgr.replayer.endpoints(), vec!["/api/a", "/api/b"]);
  }

  #[tokio::test]
  async fn test_no_notice_when_nothing_synced() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mgr = manager(
      ScriptedReplayer::failing("/api/down", u32::MAX),
      Connectivity::Online,
    )
    .with_notices(tx);
    mgr.enqueue("op", json!({}), "/api/down").await.unwrap();

    assert_eq!(mgr.synchronize().await, 0);
    drop(mgr);
    assert_eq!(rx.recv().await, None);
  }

  #[tokio::test]
  async fn test_duplicate_connectivity_events_are_noops() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online).with_notices(tx);
    mgr.enqueue("op", json!({}), "/api/a").await.unwrap();

    // Already online: no notice, no pass
    assert_eq!(mgr.handle_event(NetworkEvent::Online).await, 0);
    assert!(mgr.replayer.endpoints().is_empty());

    assert_eq!(mgr.handle_event(NetworkEvent::Offline).await, 0);
    assert_eq!(mgr.handle_event(NetworkEvent::Offline).await, 0);
    assert_eq!(mgr.connectivity(), Connectivity::Offline);
    assert_eq!(mgr.list_pending().await.unwrap().len(), 1);

    drop(mgr);
    assert_eq!(rx.recv().await, Some(Notice::warning("Offline mode enabled")));
    assert_eq!(rx.recv().await, None);
  }

  #[tokio::test]
  async fn test_background_sync_runs_replay() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online);
    mgr.enqueue("op", json!({}), "/api/a").await.unwrap();

    let ignored = NetworkEvent::BackgroundSync {
      tag: "periodic".to_string(),
    };
    assert_eq!(mgr.handle_event(ignored).await, 0);
    assert_eq!(mgr.list_pending().await.unwrap().len(), 1);

    let relayed = NetworkEvent::BackgroundSync {
      tag: BACKGROUND_SYNC_TAG.to_string(),
    };
    assert_eq!(mgr.handle_event(relayed).await, 1);
    assert!(mgr.list_pending().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_unavailable_store() {
    let store = OfflineStore::new(unopenable_location());
    let mgr = OfflineManager::new(store, ScriptedReplayer::default(), Connectivity::Online);

    assert_eq!(mgr.synchronize().await, 0);
    let err = mgr.enqueue("op", json!({}), "/api/a").await.unwrap_err();
    assert!(matches!(err, OfflineError::StoreUnavailable(_)));
    assert!(mgr.status().await.is_err());
  }

  #[tokio::test]
  async fn test_cache_write_read() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online);

    mgr
      .cache_write_with_ttl("user_prefs", json!({"lang": "fr"}), 3_600_000)
      .await
      .unwrap();
    assert_eq!(
      mgr.cache_read("user_prefs").await.unwrap(),
      Some(json!({"lang": "fr"}))
    );
    assert_eq!(mgr.cache_read("missing").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_cache_overwrite_keeps_single_entry() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online);

    mgr.cache_write("k", json!("v1")).await.unwrap();
    mgr.cache_write("k", json!("v2")).await.unwrap();

    assert_eq!(mgr.store().count_cache().await.unwrap(), 1);
    assert_eq!(mgr.cache_read("k").await.unwrap(), Some(json!("v2")));
  }

  #[tokio::test]
  async fn test_expired_entry_is_removed_on_read() {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online).with_clock(clock.clone());

    mgr.cache_write_with_ttl("k", json!(1), 100).await.unwrap();
    clock.advance(100);
    assert_eq!(mgr.cache_read("k").await.unwrap(), Some(json!(1)));

    clock.advance(50);
    assert_eq!(mgr.cache_read("k").await.unwrap(), None);
    assert!(mgr.store().get_cache("k").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_default_ttl_is_one_hour() {
    let clock = Arc::new(ManualClock::new(0));
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online).with_clock(clock.clone());

    mgr.cache_write("k", json!(true)).await.unwrap();
    let entry = mgr.store().get_cache("k").await.unwrap().unwrap();
    assert_eq!(entry.expires, 3_600_000);
  }

  #[tokio::test]
  async fn test_cache_delete_is_idempotent() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Online);

    mgr.cache_write("k", json!(1)).await.unwrap();
    mgr.cache_delete("k").await.unwrap();
    mgr.cache_delete("k").await.unwrap();
    assert_eq!(mgr.cache_read("k").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_record_offline_extraction() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Offline).with_clock(clock);

    let file = CapturedFile {
      name: "facture.pdf".to_string(),
      media_type: "application/pdf".to_string(),
      bytes: b"%PDF".to_vec(),
    };
    let id = mgr
      .record_offline_extraction(file, Some(json!({"total": 42.5})))
      .await
      .unwrap();

    let records = mgr.list_extractions().await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.id, id);
    assert_eq!(record.filename, "facture.pdf");
    assert_eq!(record.file_data, "data:application/pdf;base64,JVBERg==");
    assert_eq!(record.file_type, "application/pdf");
    assert_eq!(record.result, Some(json!({"total": 42.5})));
    assert_eq!(record.timestamp, 1_700_000_000_000);
    assert_eq!(record.status.as_str(), "offline");
    assert!(!record.synced);
  }

  #[tokio::test]
  async fn test_unreadable_capture_is_encoding_error() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Offline);

    let err = mgr
      .record_offline_extraction_from_path(Path::new("/nonexistent/scan.jpg"), None)
      .await
      .unwrap_err();
    assert!(matches!(err, OfflineError::Encoding { .. }));
    assert!(mgr.list_extractions().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_status_reports_pending_count() {
    let mgr = manager(ScriptedReplayer::default(), Connectivity::Offline);
    mgr.enqueue("op", json!({}), "/api/a").await.unwrap();

    let status = mgr.status().await.unwrap();
    assert_eq!(status.connectivity, Connectivity::Offline);
    assert_eq!(status.pending, 1);
  }
}
