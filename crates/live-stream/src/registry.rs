//! Per-device frame registry

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ring_buffer::{RingBuffer, DEFAULT_CAPACITY};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Liveness window for devices pushing preview frames
pub const PUSH_STALENESS: Duration = Duration::from_secs(10);

/// Liveness window for the registered-device listing
pub const DEVICE_STALENESS: Duration = Duration::from_secs(5 * 60);

/// Live state of one device
struct DeviceStreamState {
    frames: RingBuffer<Bytes>,
    last_update: Instant,
    last_update_wall: DateTime<Utc>,
    is_drowsy: bool,
}

impl DeviceStreamState {
    fn new(capacity: usize, now: Instant) -> Self {
        let frames = RingBuffer::new(capacity).unwrap_or_else(|_| RingBuffer::with_default_capacity());
        Self {
            frames,
            last_update: now,
            last_update_wall: Utc::now(),
            is_drowsy: false,
        }
    }

    fn is_active(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_update) < window
    }
}

/// Point-in-time view of a device for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    /// Frames pushed since the device first appeared
    pub frame_count: u64,
    /// Frames currently buffered
    pub buffered: usize,
    pub is_drowsy: bool,
    pub last_seen: DateTime<Utc>,
    pub age_ms: u64,
    pub active: bool,
}

/// Concurrency-safe map from device id to its bounded frame buffer.
///
/// The outer map is only write-locked to insert a new device; each device
/// has its own mutex, so pushes to different devices never contend and
/// pushes to the same device serialize in arrival order. No lock is held
/// across an await point.
#[derive(Clone)]
pub struct DeviceStreamRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    devices: RwLock<HashMap<String, Arc<Mutex<DeviceStreamState>>>>,
    capacity: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DeviceStreamRegistry {
    /// Create a registry buffering up to `capacity` frames per device
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("Frame buffer capacity 0 is invalid, using {}", DEFAULT_CAPACITY);
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        info!(capacity, "Creating device stream registry");

        Self {
            inner: Arc::new(RegistryInner {
                devices: RwLock::new(HashMap::new()),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    fn device(&self, device_id: &str) -> Option<Arc<Mutex<DeviceStreamState>>> {
        let devices = self.inner.devices.read().unwrap_or_else(PoisonError::into_inner);
        devices.get(device_id).cloned()
    }

    fn device_or_insert(&self, device_id: &str, now: Instant) -> Arc<Mutex<DeviceStreamState>> {
        if let Some(device) = self.device(device_id) {
            return device;
        }

        let mut devices = self.inner.devices.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(devices.entry(device_id.to_string()).or_insert_with(|| {
            info!(device_id, "New streaming device");
            metrics::gauge!("stream_devices").increment(1.0);
            Arc::new(Mutex::new(DeviceStreamState::new(self.inner.capacity, now)))
        }))
    }

    /// Append a frame for a device, evicting its oldest frame when full
    pub fn push(&self, device_id: &str, frame: Bytes) {
        self.push_at(device_id, frame, Instant::now());
    }

    /// [`push`](Self::push) with an explicit clock reading
    pub fn push_at(&self, device_id: &str, frame: Bytes, now: Instant) {
        let device = self.device_or_insert(device_id, now);
        let mut state = lock(&device);

        let bytes = frame.len();
        if state.frames.push(frame).is_some() {
            debug!(device_id, "Frame buffer full, dropped oldest");
        }
        state.last_update = now;
        state.last_update_wall = Utc::now();
        metrics::counter!("frames_pushed_total").increment(1);
        debug!(device_id, bytes, total = state.frames.total_written(), "Frame pushed");
    }

    /// Most recent frame of a device, without removing it
    pub fn latest(&self, device_id: &str) -> Option<Bytes> {
        let device = self.device(device_id)?;
        let state = lock(&device);
        state.frames.latest().cloned()
    }

    /// Buffered frames of a device, oldest first
    pub fn frames(&self, device_id: &str) -> Vec<Bytes> {
        self.device(device_id)
            .map(|device| lock(&device).frames.to_vec())
            .unwrap_or_default()
    }

    /// Set the drowsy flag of a known device. Returns false for unknown devices.
    pub fn set_drowsy(&self, device_id: &str, is_drowsy: bool) -> bool {
        match self.device(device_id) {
            Some(device) => {
                lock(&device).is_drowsy = is_drowsy;
                true
            }
            None => {
                debug!(device_id, "Drowsy flag for unknown device ignored");
                false
            }
        }
    }

    /// Last drowsy verdict of a device
    pub fn is_drowsy(&self, device_id: &str) -> Option<bool> {
        self.device(device_id).map(|device| lock(&device).is_drowsy)
    }

    /// Devices whose last push is younger than `window`, sorted by id
    pub fn list_active(&self, now: Instant, window: Duration) -> Vec<String> {
        let devices = self.inner.devices.read().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<String> = devices
            .iter()
            .filter(|(_, device)| lock(device).is_active(now, window))
            .map(|(id, _)| id.clone())
            .collect();
        active.sort();
        active
    }

    /// Every known device with liveness computed against `window`, sorted by id
    pub fn summaries(&self, now: Instant, window: Duration) -> Vec<DeviceSummary> {
        let devices = self.inner.devices.read().unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<DeviceSummary> = devices
            .iter()
            .map(|(id, device)| {
                let state = lock(device);
                DeviceSummary {
                    device_id: id.clone(),
                    frame_count: state.frames.total_written(),
                    buffered: state.frames.len(),
                    is_drowsy: state.is_drowsy,
                    last_seen: state.last_update_wall,
                    age_ms: now.saturating_duration_since(state.last_update).as_millis() as u64,
                    active: state.is_active(now, window),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        summaries
    }

    /// Number of devices ever seen
    pub fn device_count(&self) -> usize {
        self.inner.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Default for DeviceStreamRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u32) -> Bytes {
        Bytes::from(n.to_be_bytes().to_vec())
    }

    #[test]
    fn test_unknown_device() {
        let registry = DeviceStreamRegistry::default();
        assert_eq!(registry.latest("ghost"), None);
        assert!(registry.frames("ghost").is_empty());
        assert!(!registry.set_drowsy("ghost", true));
        assert_eq!(registry.is_drowsy("ghost"), None);
        assert_eq!(registry.device_count(), 0);
    }

    #[test]
    fn test_latest_is_a_peek() {
        let registry = DeviceStreamRegistry::default();
        registry.push("cab-1", frame(1));
        registry.push("cab-1", frame(2));

        assert_eq!(registry.latest("cab-1"), Some(frame(2)));
        assert_eq!(registry.latest("cab-1"), Some(frame(2)));
        assert_eq!(registry.frames("cab-1").len(), 2);
    }

    #[test]
    fn test_fifteen_pushes_keep_ten_most_recent() {
        let registry = DeviceStreamRegistry::new(10);
        for n in 0..15 {
            registry.push("cab-1", frame(n));
        }

        let kept = registry.frames("cab-1");
        assert_eq!(kept, (5..15).map(frame).collect::<Vec<_>>());
        let summary = &registry.summaries(Instant::now(), PUSH_STALENESS)[0];
        assert_eq!(summary.frame_count, 15);
        assert_eq!(summary.buffered, 10);
    }

    #[test]
    fn test_devices_are_isolated() {
        let registry = DeviceStreamRegistry::new(2);
        registry.push("a", frame(1));
        registry.push("b", frame(2));
        registry.push("b", frame(3));
        registry.push("b", frame(4));

        assert_eq!(registry.frames("a"), vec![frame(1)]);
        assert_eq!(registry.frames("b"), vec![frame(3), frame(4)]);
    }

    #[test]
    fn test_set_drowsy_independent_of_push() {
        let registry = DeviceStreamRegistry::default();
        registry.push("cab-1", frame(1));

        assert!(registry.set_drowsy("cab-1", true));
        assert_eq!(registry.is_drowsy("cab-1"), Some(true));
        assert_eq!(registry.frames("cab-1").len(), 1);

        registry.push("cab-1", frame(2));
        assert_eq!(registry.is_drowsy("cab-1"), Some(true));
    }

    #[test]
    fn test_list_active_boundary_is_exclusive() {
        let registry = DeviceStreamRegistry::default();
        let t0 = Instant::now();
        let window = Duration::from_secs(10);
        registry.push_at("cab-1", frame(1), t0);

        assert_eq!(registry.list_active(t0, window), vec!["cab-1".to_string()]);
        assert_eq!(registry.list_active(t0 + window - Duration::from_millis(1), window).len(), 1);
        assert!(registry.list_active(t0 + window, window).is_empty());
        assert!(registry.list_active(t0 + window * 2, window).is_empty());
    }

    #[test]
    fn test_two_windows_for_two_consumers() {
        let registry = DeviceStreamRegistry::default();
        let t0 = Instant::now();
        registry.push_at("old", frame(1), t0);
        registry.push_at("fresh", frame(2), t0 + Duration::from_secs(60));

        let now = t0 + Duration::from_secs(65);
        assert_eq!(registry.list_active(now, PUSH_STALENESS), vec!["fresh".to_string()]);
        assert_eq!(registry.list_active(now, DEVICE_STALENESS), vec!["fresh".to_string(), "old".to_string()]);

        let summaries = registry.summaries(now, PUSH_STALENESS);
        assert_eq!(summaries.len(), 2);
        assert!(!summaries.iter().find(|s| s.device_id == "old").unwrap().active);
        assert_eq!(summaries.iter().find(|s| s.device_id == "fresh").unwrap().age_ms, 5000);
    }

    #[test]
    fn test_zero_capacity_falls_back_to_default() {
        assert_eq!(DeviceStreamRegistry::new(0).capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_concurrent_pushes() {
        let registry = DeviceStreamRegistry::new(10);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let device = format!("cab-{}", t % 4);
                    for n in 0..100 {
                        registry.push(&device, frame(t * 1000 + n));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.device_count(), 4);
        for summary in registry.summaries(Instant::now(), PUSH_STALENESS) {
            assert_eq!(summary.frame_count, 200);
            assert_eq!(summary.buffered, 10);
        }
    }

    #[test]
    fn test_per_device_order_preserved_for_single_writer() {
        let registry = DeviceStreamRegistry::new(10);
        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for n in 0..50 {
                    registry.push("cab-1", frame(n));
                }
            })
        };
        writer.join().unwrap();

        assert_eq!(registry.frames("cab-1"), (40..50).map(frame).collect::<Vec<_>>());
    }
}
