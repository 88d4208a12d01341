//! Disk-backed blob store for avatars and message attachments.
//!
//! Blobs live under a configured root directory and are addressed by
//! forward-slash keys (`avatars/<user>.png`). The database stores keys;
//! public URLs are derived by prefixing the server's base URL. No binary
//! data ever lives in the database.

use std::path::{Path as FsPath, PathBuf};

use axum::{
  extract::{Path, State},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::Utc;
use crewhub_core::{error::AsCoreError, store::MarketStore};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Key derivation ──────────────────────────────────────────────────────────

/// File extension for a known content type; uploads outside this table are
/// refused.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
  match content_type {
    "image/png" => Some("png"),
    "image/jpeg" => Some("jpg"),
    "image/gif" => Some("gif"),
    "image/webp" => Some("webp"),
    "image/svg+xml" => Some("svg"),
    "application/pdf" => Some("pdf"),
    _ => None,
  }
}

fn content_type_for(key: &str) -> &'static str {
  match key.rsplit('.').next() {
    Some("png") => "image/png",
    Some("jpg") => "image/jpeg",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    Some("svg") => "image/svg+xml",
    Some("pdf") => "application/pdf",
    _ => "application/octet-stream",
  }
}

/// Avatar key for a user — one blob per user, overwritten on replacement.
pub fn avatar_key(user_id: Uuid, content_type: &str) -> Option<String> {
  let ext = extension_for(content_type)?;
  Some(format!("avatars/{user_id}.{ext}"))
}

/// Attachment key: sender id plus the upload timestamp, so repeated uploads
/// never collide.
pub fn attachment_key(user_id: Uuid, content_type: &str) -> Option<String> {
  let ext = extension_for(content_type)?;
  let millis = Utc::now().timestamp_millis();
  Some(format!("attachments/{user_id}-{millis}.{ext}"))
}

/// The public URL a stored key is served under.
pub fn public_url(base_url: &str, key: &str) -> String {
  format!("{}/media/{key}", base_url.trim_end_matches('/'))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A blob store rooted at one directory.
pub struct MediaStore {
  root: PathBuf,
}

impl MediaStore {
  pub fn new(root: PathBuf) -> Self { Self { root } }

  /// Map a key to a path under the root, refusing traversal attempts.
  fn resolve(&self, key: &str) -> Result<PathBuf, ApiError> {
    let ok = !key.is_empty()
      && !key.starts_with('/')
      && !key.contains('\\')
      && key.split('/').all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    if !ok {
      return Err(ApiError::BadRequest(format!("invalid media key: {key:?}")));
    }
    Ok(self.root.join(key))
  }

  /// Write a blob, creating parent directories as needed. Overwrites.
  pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ApiError> {
    let path = self.resolve(key)?;
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(&path, bytes).await.map_err(io_err)?;
    Ok(())
  }

  /// Delete a blob; deleting a missing key is not an error.
  pub async fn delete(&self, key: &str) -> Result<(), ApiError> {
    let path = self.resolve(key)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(io_err(e)),
    }
  }

  /// Read a blob in full. `None` if the key does not exist.
  pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ApiError> {
    let path = self.resolve(key)?;
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Some(bytes)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(io_err(e)),
    }
  }

  pub fn root(&self) -> &FsPath { &self.root }
}

fn io_err(e: std::io::Error) -> ApiError { ApiError::Store(Box::new(e)) }

// ─── Serving ─────────────────────────────────────────────────────────────────

/// `GET /media/*key` — read-only public access to stored blobs.
pub async fn serve<S>(
  State(state): State<AppState<S>>,
  Path(key): Path<String>,
) -> Result<Response, ApiError>
where
  S: MarketStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + AsCoreError + Send + Sync + 'static,
{
  let bytes = state
    .media
    .get(&key)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("media {key}")))?;

  Ok(
    (
      StatusCode::OK,
      [(header::CONTENT_TYPE, content_type_for(&key))],
      bytes,
    )
      .into_response(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn store() -> MediaStore {
    let dir = std::env::temp_dir().join(format!("crewhub-media-{}", Uuid::new_v4()));
    MediaStore::new(dir)
  }

  #[test]
  fn avatar_keys_are_stable_per_user() {
    let id = Uuid::new_v4();
    assert_eq!(
      avatar_key(id, "image/png").unwrap(),
      format!("avatars/{id}.png")
    );
    assert_eq!(
      avatar_key(id, "image/png"),
      avatar_key(id, "image/png"),
    );
    assert!(avatar_key(id, "text/html").is_none());
  }

  #[test]
  fn public_url_joins_base_and_key() {
    assert_eq!(
      public_url("http://localhost:8080/", "avatars/a.png"),
      "http://localhost:8080/media/avatars/a.png"
    );
  }

  #[tokio::test]
  async fn put_get_delete_round_trip() {
    let m = store();
    m.put("avatars/a.png", b"png-bytes").await.unwrap();
    assert_eq!(m.get("avatars/a.png").await.unwrap().unwrap(), b"png-bytes");

    // Overwrite semantics.
    m.put("avatars/a.png", b"newer").await.unwrap();
    assert_eq!(m.get("avatars/a.png").await.unwrap().unwrap(), b"newer");

    m.delete("avatars/a.png").await.unwrap();
    assert!(m.get("avatars/a.png").await.unwrap().is_none());

    // Deleting again is fine.
    m.delete("avatars/a.png").await.unwrap();
  }

  #[tokio::test]
  async fn traversal_keys_refused() {
    let m = store();
    assert!(m.get("../etc/passwd").await.is_err());
    assert!(m.get("/etc/passwd").await.is_err());
    assert!(m.put("a/../../b", b"x").await.is_err());
    assert!(m.get("").await.is_err());
  }
}
