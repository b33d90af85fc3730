//! Network side of synchronization: re-issuing deferred writes.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Why a single replay did not go through.
///
/// These never reach callers of `synchronize`; they only bump retry counts.
#[derive(Debug, Error)]
pub enum ReplayError {
  #[error("server answered HTTP {0}")]
  Status(u16),

  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("invalid endpoint '{endpoint}': {source}")]
  InvalidEndpoint {
    endpoint: String,
    #[source]
    source: url::ParseError,
  },
}

/// Sends a pending request's payload to its endpoint.
pub trait Replayer: Send + Sync {
  fn replay(
    &self,
    endpoint: &str,
    payload: &Value,
  ) -> impl Future<Output = Result<(), ReplayError>> + Send;
}

/// Replays requests as JSON POSTs against a base URL.
#[derive(Clone)]
pub struct HttpReplayer {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpReplayer {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ReplayError> {
    let base_url = Url::parse(base_url).map_err(|source| ReplayError::InvalidEndpoint {
      endpoint: base_url.to_string(),
      source,
    })?;

    let client = reqwest::Client::builder().timeout(timeout).build()?;

    Ok(Self { client, base_url })
  }

  /// Resolve an endpoint against the base URL. Absolute URLs pass through.
  pub fn resolve(&self, endpoint: &str) -> Result<Url, ReplayError> {
    self
      .base_url
      .join(endpoint)
      .map_err(|source| ReplayError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        source,
      })
  }

  /// Build the POST for one pending request. The body is the JSON payload.
  pub fn request(&self, endpoint: &str, payload: &Value) -> Result<reqwest::Request, ReplayError> {
    let url = self.resolve(endpoint)?;
    Ok(self.client.post(url).json(payload).build()?)
  }

  /// Whether the server answers at all. Any HTTP response counts as online.
  pub async fn is_reachable(&self, path: &str) -> bool {
    let url = match self.resolve(path) {
      Ok(url) => url,
      Err(_) => return false,
    };

    match self.client.head(url).send().await {
      Ok(_) => true,
      Err(e) => {
        tracing::debug!(error = %e, "connectivity probe failed");
        false
      }
    }
  }
}

impl Replayer for HttpReplayer {
  async fn replay(&self, endpoint: &str, payload: &Value) -> Result<(), ReplayError> {
    let request = self.request(endpoint, payload)?;
    let response = self.client.execute(request).await?;

    let status = response.status();
    if status.is_success() {
      Ok(())
    } else {
      Err(ReplayError::Status(status.as_u16()))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn replayer() -> HttpReplayer {
    HttpReplayer::new("https://facto.example/app/", Duration::from_secs(1)).unwrap()
  }

  #[test]
  fn test_relative_endpoint_joins_base() {
    assert_eq!(
      replayer().resolve("/api/upload").unwrap().as_str(),
      "https://facto.example/api/upload"
    );
    assert_eq!(
      replayer().resolve("api/upload").unwrap().as_str(),
      "https://facto.example/app/api/upload"
    );
  }

  #[test]
  fn test_absolute_endpoint_passes_through() {
    assert_eq!(
      replayer().resolve("https://other.example/api/sync").unwrap().as_str(),
      "https://other.example/api/sync"
    );
  }

  #[test]
  fn test_request_posts_json_payload() {
    let payload = serde_json::json!({"file": "a.pdf", "pages": 2});
    let request = replayer().request("/api/upload", &payload).unwrap();

    assert_eq!(request.method(), &reqwest::Method::POST);
    assert_eq!(request.url().as_str(), "https://facto.example/api/upload");
    assert_eq!(
      request.headers()[reqwest::header::CONTENT_TYPE],
      "application/json"
    );

    let body = request.body().and_then(|b| b.as_bytes()).unwrap();
    let sent: Value = serde_json::from_slice(body).unwrap();
    assert_eq!(sent, payload);
  }

  #[test]
  fn test_invalid_base_url() {
    let err = HttpReplayer::new("not a url", Duration::from_secs(1))
      .err()
      .unwrap();
    assert!(matches!(err, ReplayError::InvalidEndpoint { .. }));
  }

  #[tokio::test]
  async fn test_unreachable_server_is_transport_error() {
    // Port 9 (discard) on localhost is closed in test environments
    let replayer = HttpReplayer::new("http://127.0.0.1:9/", Duration::from_secs(2)).unwrap();
    let err = replayer
      .replay("/api/sync", &serde_json::json!({}))
      .await
      .unwrap_err();
    assert!(matches!(err, ReplayError::Transport(_)));
    assert!(!replayer.is_reachable("/").await);
  }
}
