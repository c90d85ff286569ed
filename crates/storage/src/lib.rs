//! Storage Layer
//!
//! Persistence for detections, alerts and enrolled drivers, behind the
//! [`DetectionStore`] and [`DriverRoster`] traits. Ships an in-memory
//! repository, a SQLite repository and an on-disk frame archive.

mod archive;
mod events;
mod repository;
mod sqlite;

pub use archive::FrameArchive;
pub use events::{AlertEvent, AlertRecord, DetectionEvent, DetectionRecord};
pub use repository::Repository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use driver_auth::DriverRecord;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}

impl From<postcard::Error> for StorageError {
    fn from(e: postcard::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

/// Write side of the detection flow plus the driver snapshot it matches against
#[async_trait]
pub trait DetectionStore: Send + Sync {
    /// Persist a detection, returning its id
    async fn record_detection(&self, event: &DetectionEvent) -> Result<i64, StorageError>;

    /// Persist an alert, returning its id
    async fn record_alert(&self, event: &AlertEvent) -> Result<i64, StorageError>;

    /// Every driver that has an enrolled embedding
    async fn find_drivers_with_embedding(&self) -> Result<Vec<DriverRecord>, StorageError>;
}

/// Driver enrollment, used only by the registration/login flow
#[async_trait]
pub trait DriverRoster: Send + Sync {
    async fn enroll_driver(&self, display_name: &str, embedding: Vec<f32>) -> Result<DriverRecord, StorageError>;
}
