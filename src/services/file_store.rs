use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use chrono::Utc;
use tokio::fs;
use uuid::Uuid;
use crate::error::AppError;
use crate::services::excel::utils::file_extension;

/// A file written to the upload directory.
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub filename: String,
    pub path: PathBuf,
}

/// Uploaded spreadsheets on local disk, one file per upload.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub async fn ensure_dir(&self) -> Result<(), AppError> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    pub async fn save(&self, original_name: &str, data: &[u8]) -> Result<StoredFile, AppError> {
        let filename = format!(
            "file-{}-{}{}",
            Utc::now().timestamp_millis(),
            Uuid::new_v4().simple(),
            file_extension(original_name).unwrap_or_default()
        );
        let path = self.base_dir.join(&filename);
        fs::write(&path, data).await?;
        tracing::debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(StoredFile { filename, path })
    }

    /// Removes a stored file. A file that is already gone counts as removed and
    /// other failures are only logged, so callers can always finish their cleanup.
    pub async fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        match fs::remove_file(path).await {
            Ok(()) => tracing::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} already absent", path.display())
            }
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}
