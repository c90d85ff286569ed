//! SQLite repository

use crate::{AlertEvent, DetectionEvent, DetectionStore, DriverRoster, StorageError};
use async_trait::async_trait;
use driver_auth::DriverRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS drivers (
        id TEXT PRIMARY KEY,
        display_name TEXT NOT NULL,
        embedding BLOB,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE TABLE IF NOT EXISTS detections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL,
        driver_id TEXT,
        user_id TEXT,
        similarity REAL,
        face_detected INTEGER NOT NULL,
        eye_aspect_ratio REAL NOT NULL,
        mouth_aspect_ratio REAL NOT NULL,
        head_tilt REAL NOT NULL,
        is_drowsy INTEGER NOT NULL,
        image_path TEXT,
        captured_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS alerts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        detection_id INTEGER REFERENCES detections(id),
        device_id TEXT NOT NULL,
        driver_id TEXT,
        alert_type TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

/// Repository backed by a SQLite database via sqlx
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect (creating the file if needed) and apply the schema.
    ///
    /// `sqlite::memory:` URLs are pinned to one connection so every query
    /// sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!(url = %database_url, "SQLite repository ready");
        Ok(Self { pool })
    }

    /// Total rows in a table
    async fn count(&self, table: &str) -> Result<i64, StorageError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    pub async fn detection_count(&self) -> Result<i64, StorageError> {
        self.count("detections").await
    }

    pub async fn alert_count(&self) -> Result<i64, StorageError> {
        self.count("alerts").await
    }

    /// Insert a driver, with or without an embedding
    pub async fn insert_driver(&self, driver: &DriverRecord) -> Result<(), StorageError> {
        let blob = driver
            .embedding
            .as_ref()
            .map(|vector| postcard::to_allocvec(vector))
            .transpose()?;

        sqlx::query("INSERT INTO drivers (id, display_name, embedding) VALUES (?, ?, ?)")
            .bind(driver.id.to_string())
            .bind(&driver.display_name)
            .bind(blob)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DetectionStore for SqliteRepository {
    async fn record_detection(&self, event: &DetectionEvent) -> Result<i64, StorageError> {
        let metrics = &event.metrics;
        let result = sqlx::query(
            "INSERT INTO detections
                (device_id, driver_id, user_id, similarity, face_detected,
                 eye_aspect_ratio, mouth_aspect_ratio, head_tilt, is_drowsy, image_path, captured_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.device_id)
        .bind(event.driver_id.map(|id| id.to_string()))
        .bind(event.user_id.map(|id| id.to_string()))
        .bind(event.similarity)
        .bind(metrics.face_detected)
        .bind(metrics.ear)
        .bind(metrics.mar)
        .bind(metrics.head_tilt)
        .bind(metrics.is_drowsy)
        .bind(event.image_path.as_deref())
        .bind(event.captured_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, device_id = %event.device_id, "Inserted detection");
        Ok(id)
    }

    async fn record_alert(&self, event: &AlertEvent) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO alerts (detection_id, device_id, driver_id, alert_type, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.detection_id)
        .bind(&event.device_id)
        .bind(event.driver_id.map(|id| id.to_string()))
        .bind(event.kind.as_str())
        .bind(event.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_drivers_with_embedding(&self) -> Result<Vec<DriverRecord>, StorageError> {
        let rows = sqlx::query("SELECT id, display_name, embedding FROM drivers WHERE embedding IS NOT NULL")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<DriverRecord, StorageError> {
                let id: String = row.try_get("id")?;
                let blob: Vec<u8> = row.try_get("embedding")?;
                Ok(DriverRecord {
                    id: Uuid::parse_str(&id).map_err(|e| StorageError::SerializationError(e.to_string()))?,
                    display_name: row.try_get("display_name")?,
                    embedding: Some(postcard::from_bytes(&blob)?),
                })
            })
            .collect()
    }
}

#[async_trait]
impl DriverRoster for SqliteRepository {
    async fn enroll_driver(&self, display_name: &str, embedding: Vec<f32>) -> Result<DriverRecord, StorageError> {
        let driver = DriverRecord {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            embedding: Some(embedding),
        };
        self.insert_driver(&driver).await?;
        info!(driver_id = %driver.id, "Enrolled driver");
        Ok(driver)
    }
}
