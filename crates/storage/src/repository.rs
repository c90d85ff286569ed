//! In-memory repository

use crate::{AlertEvent, AlertRecord, DetectionEvent, DetectionRecord, DetectionStore, DriverRoster, StorageError};
use async_trait::async_trait;
use driver_auth::DriverRecord;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Repository for data access (in-memory implementation)
pub struct Repository {
    /// Detection records, oldest first
    detections: Mutex<VecDeque<DetectionRecord>>,
    /// Alert records, oldest first
    alerts: Mutex<VecDeque<AlertRecord>>,
    /// Enrolled drivers
    drivers: Mutex<Vec<DriverRecord>>,
    /// Max detection records kept
    max_detection_records: usize,
    /// Max alert records kept
    max_alert_records: usize,
    /// Next detection / alert ID
    next_id: Mutex<(i64, i64)>,
}

fn lock_error<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::DatabaseError(format!("Lock error: {}", e))
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        info!("Creating in-memory repository");
        Self {
            detections: Mutex::new(VecDeque::with_capacity(1000)),
            alerts: Mutex::new(VecDeque::with_capacity(100)),
            drivers: Mutex::new(Vec::new()),
            max_detection_records: 100_000, // ~3 hours of one device at 10 detects/s
            max_alert_records: 10_000,
            next_id: Mutex::new((1, 1)),
        }
    }

    /// Add a driver record directly (seeding, tests)
    pub fn insert_driver(&self, driver: DriverRecord) -> Result<(), StorageError> {
        self.drivers.lock().map_err(lock_error)?.push(driver);
        Ok(())
    }

    /// Get recent detections, newest first
    pub fn get_detections(&self, limit: usize) -> Result<Vec<DetectionRecord>, StorageError> {
        let detections = self.detections.lock().map_err(lock_error)?;
        Ok(detections.iter().rev().take(limit).cloned().collect())
    }

    /// Get recent alerts, newest first
    pub fn get_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StorageError> {
        let alerts = self.alerts.lock().map_err(lock_error)?;
        Ok(alerts.iter().rev().take(limit).cloned().collect())
    }

    /// Get total detection count
    pub fn detection_count(&self) -> usize {
        self.detections.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Get total alert count
    pub fn alert_count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }

    /// Get enrolled driver count
    pub fn driver_count(&self) -> usize {
        self.drivers.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Clear detections and alerts (for testing)
    pub fn clear(&self) {
        if let Ok(mut detections) = self.detections.lock() {
            detections.clear();
        }
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.clear();
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetectionStore for Repository {
    async fn record_detection(&self, event: &DetectionEvent) -> Result<i64, StorageError> {
        let mut detections = self.detections.lock().map_err(lock_error)?;
        let mut ids = self.next_id.lock().map_err(lock_error)?;

        let id = ids.0;
        ids.0 += 1;

        // Enforce retention
        while detections.len() >= self.max_detection_records {
            detections.pop_front();
        }

        detections.push_back(DetectionRecord {
            id,
            event: event.clone(),
        });
        debug!(id, device_id = %event.device_id, "Inserted detection");
        Ok(id)
    }

    async fn record_alert(&self, event: &AlertEvent) -> Result<i64, StorageError> {
        let mut alerts = self.alerts.lock().map_err(lock_error)?;
        let mut ids = self.next_id.lock().map_err(lock_error)?;

        let id = ids.1;
        ids.1 += 1;

        while alerts.len() >= self.max_alert_records {
            alerts.pop_front();
        }

        alerts.push_back(AlertRecord {
            id,
            event: event.clone(),
        });
        debug!(id, kind = event.kind.as_str(), "Inserted alert");
        Ok(id)
    }

    async fn find_drivers_with_embedding(&self) -> Result<Vec<DriverRecord>, StorageError> {
        let drivers = self.drivers.lock().map_err(lock_error)?;
        Ok(drivers.iter().filter(|d| d.embedding.is_some()).cloned().collect())
    }
}

#[async_trait]
impl DriverRoster for Repository {
    async fn enroll_driver(&self, display_name: &str, embedding: Vec<f32>) -> Result<DriverRecord, StorageError> {
        let driver = DriverRecord {
            id: Uuid::new_v4(),
            display_name: display_name.to_string(),
            embedding: Some(embedding),
        };
        self.insert_driver(driver.clone())?;
        info!(driver_id = %driver.id, name = %driver.display_name, "Enrolled driver");
        Ok(driver)
    }
}
