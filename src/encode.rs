//! Turning captured files into self-contained text.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{OfflineError, Result};
use crate::model::CapturedFile;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Encode bytes as a `data:` URL.
pub fn to_data_url(media_type: &str, bytes: &[u8]) -> String {
  let media_type = if media_type.is_empty() {
    FALLBACK_MEDIA_TYPE
  } else {
    media_type
  };
  format!("data:{};base64,{}", media_type, STANDARD.encode(bytes))
}

/// Guess a media type from the file extension.
///
/// Only the formats the scanner accepts are listed.
pub fn media_type_for(path: &Path) -> &'static str {
  let ext = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());

  match ext.as_deref() {
    Some("pdf") => "application/pdf",
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("png") => "image/png",
    Some("webp") => "image/webp",
    Some("heic") => "image/heic",
    Some("tif") | Some("tiff") => "image/tiff",
    _ => FALLBACK_MEDIA_TYPE,
  }
}

/// Read a capture from disk.
pub async fn read_captured_file(path: &Path) -> Result<CapturedFile> {
  let bytes = tokio::fs::read(path)
    .await
    .map_err(|source| OfflineError::Encoding {
      path: path.to_path_buf(),
      source,
    })?;

  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();

  Ok(CapturedFile {
    name,
    media_type: media_type_for(path).to_string(),
    bytes,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_data_url_format() {
    assert_eq!(
      to_data_url("application/pdf", b"%PDF"),
      "data:application/pdf;base64,JVBERg=="
    );
  }

  #[test]
  fn test_empty_media_type_falls_back() {
    assert_eq!(
      to_data_url("", b"hi"),
      "data:application/octet-stream;base64,aGk="
    );
  }

  #[test]
  fn test_media_type_is_case_insensitive() {
    assert_eq!(media_type_for(Path::new("scan.JPG")), "image/jpeg");
    assert_eq!(media_type_for(Path::new("facture.pdf")), "application/pdf");
    assert_eq!(media_type_for(Path::new("notes")), FALLBACK_MEDIA_TYPE);
  }

  #[tokio::test]
  async fn test_read_missing_file_is_encoding_error() {
    let err = read_captured_file(Path::new("/nonexistent/scan.png"))
      .await
      .unwrap_err();
    assert!(matches!(err, OfflineError::Encoding { .. }));
  }

  #[tokio::test]
  async fn test_read_captured_file() {
    let path = std::env::temp_dir().join(format!("factosync-encode-{}.png", std::process::id()));
    tokio::fs::write(&path, b"\x89PNG").await.unwrap();

    let file = read_captured_file(&path).await.unwrap();
    assert_eq!(file.media_type, "image/png");
    assert_eq!(file.bytes, b"\x89PNG");
    assert!(file.name.ends_with(".png"));

    let _ = tokio::fs::remove_file(&path).await;
  }
}
