//! On-disk archive of analyzed frames

use crate::StorageError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes encoded detect frames to an upload directory
#[derive(Debug, Clone)]
pub struct FrameArchive {
    dir: PathBuf,
}

impl FrameArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a frame: `<device>_<YYYYmmdd_HHMMSS_mmm>.jpg`.
    ///
    /// Characters outside `[A-Za-z0-9_-]` in the device id become `_` so an id
    /// can never escape the archive directory.
    pub fn file_name(device_id: &str, captured_at: DateTime<Utc>) -> String {
        let device: String = device_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{}_{}.jpg", device, captured_at.format("%Y%m%d_%H%M%S_%3f"))
    }

    /// Store the frame, creating the directory on first use
    pub async fn save(
        &self,
        device_id: &str,
        captured_at: DateTime<Utc>,
        encoded: &[u8],
    ) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(device_id, captured_at));
        tokio::fs::write(&path, encoded).await?;
        debug!(path = %path.display(), bytes = encoded.len(), "Archived frame");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_file_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(FrameArchive::file_name("esp32-cab_1", at), "esp32-cab_1_20240309_140507_000.jpg");
    }

    #[test]
    fn test_file_name_sanitizes_device_id() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let name = FrameArchive::file_name("../../etc/passwd", at);
        assert!(!name.contains('/'));
        assert!(name.starts_with("______etc_passwd_"));
    }

    #[tokio::test]
    async fn test_save_writes_bytes() {
        let dir = std::env::temp_dir().join(format!("frame-archive-{}", Uuid::new_v4()));
        let archive = FrameArchive::new(&dir);

        let path = archive.save("cab-1", Utc::now(), b"jpeg-bytes").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"jpeg-bytes");
        assert!(path.starts_with(&dir));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
