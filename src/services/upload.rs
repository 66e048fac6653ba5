//! Temporary on-disk copies of uploaded payloads.

use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

/// An upload written to disk; the file is removed when this is dropped.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl StagedUpload {
    /// Write `data` to a uniquely named file in `dir` ending in `extension`.
    pub async fn write(dir: &Path, extension: &str, data: Bytes) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        let dir: PathBuf = dir.to_path_buf();
        let extension = extension.to_string();
        let path = tokio::task::spawn_blocking(move || -> std::io::Result<TempPath> {
            let mut file = tempfile::Builder::new()
                .prefix("upload-")
                .suffix(&extension)
                .tempfile_in(&dir)?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file.into_temp_path())
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!(path = %path.display(), "Staged upload");
        Ok(Self {
            path: path.to_path_buf(),
            temp: Some(path),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            match temp.close() {
                Ok(()) => debug!(path = %self.path.display(), "Removed staged upload"),
                Err(e) => warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove staged upload"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_exists_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedUpload::write(dir.path(), ".pdf", Bytes::from_static(b"%PDF-1.4"))
            .await
            .unwrap();

        let path = staged.path().to_path_buf();
        assert_eq!(path.extension().unwrap(), "pdf");
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("uploads").join("inner");
        let staged = StagedUpload::write(&nested, "", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(staged.path().starts_with(&nested));
    }
}
