use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::models::timestamp;

/// Extensions accepted by the upload endpoint, with the MIME type each one is
/// served as.
pub const ALLOWED_TYPES: &[(&str, &str)] = &[
  ("pdf", "application/pdf"),
  ("doc", "application/msword"),
  (
    "docx",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
  ),
  ("txt", "text/plain"),
  ("mp4", "video/mp4"),
  ("mp3", "audio/mpeg"),
  ("jpg", "image/jpeg"),
  ("jpeg", "image/jpeg"),
  ("png", "image/png"),
  ("gif", "image/gif"),
];

const MAX_STEM_LENGTH: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
  #[error("File too large")]
  TooLarge { limit: u64 },
  #[error("Invalid file type. Allowed types: {}", allowed_list())]
  InvalidType(String),
  #[error("Invalid file name")]
  InvalidName,
  #[error("File not found")]
  NotFound,
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

fn allowed_list() -> String {
  ALLOWED_TYPES
    .iter()
    .map(|(ext, _)| *ext)
    .collect::<Vec<_>>()
    .join(", ")
}

/// Metadata for a file written by [`LocalFileStorage::save`].
#[derive(Debug, Clone)]
pub struct StoredFile {
  pub original_name: String,
  pub file_name: String,
  pub path: PathBuf,
  pub size: u64,
  pub mime_type: &'static str,
  pub uploaded_at: String,
}

/// Upload directory on local disk. File names are flat; nothing is written
/// outside `base_path`.
pub struct LocalFileStorage {
  base_path: PathBuf,
  max_file_size: u64,
}

impl LocalFileStorage {
  pub fn new(base_path: impl AsRef<Path>, max_file_size: u64) -> Self {
    Self {
      base_path: base_path.as_ref().to_path_buf(),
      max_file_size,
    }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  pub fn max_file_size(&self) -> u64 {
    self.max_file_size
  }

  /// Initialize the upload directory
  pub async fn init(&self) -> Result<(), UploadError> {
    fs::create_dir_all(&self.base_path).await?;
    Ok(())
  }

  /// Path for a stored file name. Rejects anything that is not a plain name.
  pub fn resolve(&self, file_name: &str) -> Result<PathBuf, UploadError> {
    let plain = !file_name.is_empty()
      && !file_name.starts_with('.')
      && !file_name.contains(['/', '\\'])
      && !file_name.contains("..");
    if !plain {
      return Err(UploadError::InvalidName);
    }
    Ok(self.base_path.join(file_name))
  }

  pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<StoredFile, UploadError> {
    if data.len() as u64 > self.max_file_size {
      return Err(UploadError::TooLarge {
        limit: self.max_file_size,
      });
    }
    let now = Utc::now();
    let file_name = generate_file_name(original_name, now)?;
    let mime_type = extension(&file_name)
      .as_deref()
      .and_then(mime_type)
      .ok_or_else(|| UploadError::InvalidType(original_name.to_string()))?;
    let path = self.resolve(&file_name)?;

    let mut file = File::create(&path).await?;
    file.write_all(data).await?;
    file.flush().await?;

    Ok(StoredFile {
      original_name: original_name.to_string(),
      file_name,
      path,
      size: data.len() as u64,
      mime_type,
      uploaded_at: timestamp::format(now),
    })
  }

  pub async fn read(&self, file_name: &str) -> Result<Vec<u8>, UploadError> {
    let path = self.resolve(file_name)?;
    match fs::read(&path).await {
      Ok(data) => Ok(data),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(UploadError::NotFound),
      Err(e) => Err(e.into()),
    }
  }

  /// Returns false when there was nothing to delete.
  pub async fn delete(&self, file_name: &str) -> Result<bool, UploadError> {
    let path = self.resolve(file_name)?;
    match fs::remove_file(&path).await {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(e.into()),
    }
  }
}

/// Lowercased extension of a file name.
pub fn extension(name: &str) -> Option<String> {
  Path::new(name)
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase())
}

pub fn mime_type(ext: &str) -> Option<&'static str> {
  ALLOWED_TYPES
    .iter()
    .find(|(allowed, _)| *allowed == ext)
    .map(|(_, mime)| *mime)
}

/// `resource_<stem>_<millis>.<ext>`, with the stem reduced to ASCII
/// alphanumerics and underscores.
pub fn generate_file_name(original: &str, now: DateTime<Utc>) -> Result<String, UploadError> {
  let ext = extension(original).ok_or_else(|| UploadError::InvalidType(original.to_string()))?;
  if mime_type(&ext).is_none() {
    return Err(UploadError::InvalidType(original.to_string()));
  }
  let stem = Path::new(original)
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or_default();
  let mut sanitized: String = stem
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
    .take(MAX_STEM_LENGTH)
    .collect();
  if sanitized.trim_matches('_').is_empty() {
    sanitized = "file".to_string();
  }
  Ok(format!(
    "resource_{}_{}.{}",
    sanitized,
    now.timestamp_millis(),
    ext
  ))
}

/// Human-readable size, e.g. `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
  let mut value = bytes as f64;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  let rounded = format!("{:.2}", value);
  let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
  format!("{} {}", trimmed, UNITS[unit])
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_generate_file_name() {
    let now = Utc.timestamp_millis_opt(1_717_000_000_000).unwrap();
    assert_eq!(
      generate_file_name("Exam Stress Guide (v2).PDF", now).unwrap(),
      "resource_Exam_Stress_Guide__v2__1717000000000.pdf"
    );
    assert_eq!(
      generate_file_name("..png", now).unwrap(),
      "resource_file_1717000000000.png"
    );
    assert!(matches!(
      generate_file_name("payload.exe", now),
      Err(UploadError::InvalidType(_))
    ));
    assert!(generate_file_name("README", now).is_err());
  }

  #[test]
  fn test_format_file_size() {
    assert_eq!(format_file_size(0), "0 B");
    assert_eq!(format_file_size(512), "512 B");
    assert_eq!(format_file_size(1536), "1.5 KB");
    assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
    assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3 GB");
  }

  #[test]
  fn test_resolve_rejects_traversal() {
    let storage = LocalFileStorage::new("/tmp/uploads", 1024);
    assert!(storage.resolve("resource_a_1.pdf").is_ok());
    assert!(storage.resolve("../etc/passwd").is_err());
    assert!(storage.resolve("a/b.pdf").is_err());
    assert!(storage.resolve(".hidden").is_err());
    assert!(storage.resolve("").is_err());
  }

  #[tokio::test]
  async fn test_save_read_delete() {
    let dir = tempfile::tempdir().unwrap();
    let storage = LocalFileStorage::new(dir.path().join("uploads"), 16);
    storage.init().await.unwrap();

    let stored = storage.save("notes.txt", b"breathe").await.unwrap();
    assert_eq!(stored.mime_type, "text/plain");
    assert_eq!(stored.size, 7);
    assert_eq!(storage.read(&stored.file_name).await.unwrap(), b"breathe");

    assert!(storage.delete(&stored.file_name).await.unwrap());
    assert!(!storage.delete(&stored.file_name).await.unwrap());
    assert!(matches!(
      storage.read(&stored.file_name).await,
      Err(UploadError::NotFound)
    ));

    let too_big = storage.save("big.txt", &[0u8; 17]).await;
    assert!(matches!(too_big, Err(UploadError::TooLarge { limit: 16 })));
  }
}
