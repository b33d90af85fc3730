mod logging;

use clap::{Parser, Subcommand};
use color_eyre::{
  eyre::{eyre, WrapErr},
  Result,
};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use factosync::config::{self, Config};
use factosync::event::{ConnectivityMonitor, NoticeLevel, BACKGROUND_SYNC_TAG};
use factosync::{
  Connectivity, HttpReplayer, NetworkEvent, Notice, OfflineManager, OfflineStore, StoreLocation,
};

#[derive(Parser, Debug)]
#[command(name = "factosync")]
#[command(about = "Offline request queue and cache for the FactoSheet client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/factosync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Start in offline mode instead of probing the server
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Save a write request for later replay
  Enqueue {
    /// Operation kind, e.g. invoice_upload
    kind: String,
    /// Endpoint the payload is POSTed to
    endpoint: String,
    /// JSON payload
    payload: String,
  },
  /// Replay pending requests now
  Sync,
  /// Relay a background sync signal
  BackgroundSync {
    #[arg(long, default_value = BACKGROUND_SYNC_TAG)]
    tag: String,
  },
  /// Read and write cached values
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },
  /// Record a document captured while offline
  Capture {
    file: PathBuf,
    /// JSON processing result to store with the capture
    #[arg(long)]
    result: Option<String>,
  },
  /// Show connectivity and pending request count
  Status,
  /// List pending requests
  Pending,
  /// List offline extractions
  Extractions,
  /// Follow connectivity changes and synchronize on reconnect
  Watch,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  Set {
    key: String,
    /// JSON value
    value: String,
    /// Time-to-live in milliseconds
    #[arg(long)]
    ttl_ms: Option<i64>,
  },
  Get {
    key: String,
  },
  Delete {
    key: String,
  },
}

impl Command {
  /// Whether the command behaves differently online and offline
  fn needs_connectivity(&self) -> bool {
    matches!(
      self,
      Command::Sync | Command::Status | Command::Watch | Command::BackgroundSync { .. }
    )
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config::data_dir()?.join("logs"))?;

  let replayer = HttpReplayer::new(
    &config.base_url,
    Duration::from_secs(config.request_timeout_secs),
  )
  .map_err(|e| eyre!("Invalid base_url '{}': {}", config.base_url, e))?;

  let initial = if args.offline || !args.command.needs_connectivity() {
    Connectivity::Offline
  } else if replayer.is_reachable(&config.probe.path).await {
    Connectivity::Online
  } else {
    Connectivity::Offline
  };
  tracing::info!(?initial, base_url = %config.base_url, "starting");

  let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
  let store = OfflineStore::new(StoreLocation::File(config.database_path()?));
  let manager = OfflineManager::new(store, replayer.clone(), initial)
    .with_default_ttl(config.cache_ttl_ms)
    .with_notices(notice_tx);

  match args.command {
    Command::Enqueue {
      kind,
      endpoint,
      payload,
    } => {
      let payload = parse_json(&payload)?;
      let id = manager.enqueue(&kind, payload, &endpoint).await?;
      println!("{}", id);
    }
    Command::Sync => {
      if !manager.connectivity().is_online() {
        println!("offline, nothing replayed");
      } else {
        let count = manager.synchronize().await;
        println!("{} request(s) synchronized", count);
      }
    }
    Command::BackgroundSync { tag } => {
      let count = manager
        .handle_event(NetworkEvent::BackgroundSync { tag })
        .await;
      println!("{} request(s) synchronized", count);
    }
    Command::Cache { action } => match action {
      CacheAction::Set { key, value, ttl_ms } => {
        let value = parse_json(&value)?;
        match ttl_ms {
          Some(ttl) => manager.cache_write_with_ttl(&key, value, ttl).await?,
          None => manager.cache_write(&key, value).await?,
        }
      }
      CacheAction::Get { key } => match manager.cache_read(&key).await? {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => {
          return Err(eyre!("No cached value for '{}'", key));
        }
      },
      CacheAction::Delete { key } => manager.cache_delete(&key).await?,
    },
    Command::Capture { file, result } => {
      let result = result.as_deref().map(parse_json).transpose()?;
      let id = manager
        .record_offline_extraction_from_path(&file, result)
        .await?;
      println!("{}", id);
    }
    Command::Status => {
      let status = manager.status().await?;
      let state = if status.connectivity.is_online() {
        "online"
      } else {
        "offline"
      };
      println!("{} ({} pending)", state, status.pending);
    }
    Command::Pending => {
      let pending = manager.list_pending().await?;
      println!("{}", serde_json::to_string_pretty(&pending)?);
    }
    Command::Extractions => {
      for record in manager.list_extractions().await? {
        println!(
          "{}\t{}\t{}\t{}\tsynced={}",
          record.id,
          record.filename,
          record.file_type,
          record.status.as_str(),
          record.synced
        );
      }
    }
    Command::Watch => {
      tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
          print_notice(&notice);
        }
      });

      // Whatever is queued goes out as soon as we know we are online
      if manager.connectivity().is_online() {
        manager.synchronize().await;
      }

      let mut monitor = ConnectivityMonitor::spawn(
        replayer,
        config.probe.path.clone(),
        Duration::from_secs(config.probe.interval_secs.max(1)),
        initial,
      );

      loop {
        tokio::select! {
          event = monitor.next() => match event {
            Some(event) => {
              manager.handle_event(event).await;
            }
            None => break,
          },
          _ = tokio::signal::ctrl_c() => break,
        }
      }
      return Ok(());
    }
  }

  while let Ok(notice) = notice_rx.try_recv() {
    print_notice(&notice);
  }

  Ok(())
}

fn parse_json(raw: &str) -> Result<Value> {
  serde_json::from_str(raw).wrap_err_with(|| format!("Invalid JSON: {}", raw))
}

fn print_notice(notice: &Notice) {
  let marker = match notice.level {
    NoticeLevel::Success => "+",
    NoticeLevel::Warning => "!",
  };
  eprintln!("[{}] {}", marker, notice.message);
}
