use std::time::Duration;
use tokio::sync::mpsc;

use crate::replay::HttpReplayer;

/// Tag the caching layer uses when it relays a background sync.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

impl Connectivity {
  pub fn is_online(self) -> bool {
    matches!(self, Connectivity::Online)
  }
}

/// Signals the manager reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
  Online,
  Offline,
  /// Deferred work may be attempted; only `BACKGROUND_SYNC_TAG` is handled
  BackgroundSync { tag: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Success,
  Warning,
}

/// Short, non-blocking status message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

impl Notice {
  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Success,
      message: message.into(),
    }
  }

  pub fn warning(message: impl Into<String>) -> Self {
    Self {
      level: NoticeLevel::Warning,
      message: message.into(),
    }
  }
}

/// Polls the server and turns reachability changes into network events
pub struct ConnectivityMonitor {
  rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl ConnectivityMonitor {
  /// Start probing `probe_path` every `interval`.
  ///
  /// `initial` is the state the manager started in; only changes from it
  /// are reported.
  pub fn spawn(
    replayer: HttpReplayer,
    probe_path: String,
    interval: Duration,
    initial: Connectivity,
  ) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut last = initial;
      let mut ticker = tokio::time::interval(interval);

      loop {
        ticker.tick().await;

        let now = if replayer.is_reachable(&probe_path).await {
          Connectivity::Online
        } else {
          Connectivity::Offline
        };

        if now == last {
          continue;
        }
        last = now;

        let event = match now {
          Connectivity::Online => NetworkEvent::Online,
          Connectivity::Offline => NetworkEvent::Offline,
        };
        if tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { rx }
  }

  /// Receive the next connectivity change
  pub async fn next(&mut self) -> Option<NetworkEvent> {
    self.rx.recv().await
  }
}
