//! Device liveness tracking
//!
//! Stores per-device timestamps only; the online classification is derived
//! at query time from timestamp freshness, never stored. All operations are
//! per-key so heavy inbound traffic never locks the whole table.

use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};

/// Derived online-state classification for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Never issued a connection configuration and no fresh heartbeat
    NoDevice,
    /// Registered but no fresh heartbeat or activity
    Offline,
    /// Fresh heartbeat, or registered with fresh activity
    Online,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::NoDevice => write!(f, "NO_DEVICE"),
            DeviceStatus::Offline => write!(f, "OFFLINE"),
            DeviceStatus::Online => write!(f, "ONLINE"),
        }
    }
}

/// Tracks heartbeat/activity timestamps and registration per device
pub struct LivenessTracker {
    heartbeat_window: Duration,
    activity_window: Duration,
    /// Last explicit heartbeat/status message per device
    heartbeats: DashMap<String, Instant>,
    /// Last inbound message of any kind per device
    activities: DashMap<String, Instant>,
    /// Devices a connection configuration has been issued for
    registered: DashSet<String>,
}

impl LivenessTracker {
    pub fn new(heartbeat_window: Duration, activity_window: Duration) -> Self {
        Self {
            heartbeat_window,
            activity_window,
            heartbeats: DashMap::new(),
            activities: DashMap::new(),
            registered: DashSet::new(),
        }
    }

    /// Record an explicit heartbeat/status message
    pub fn record_heartbeat(&self, device_id: &str, now: Instant) {
        self.heartbeats.insert(device_id.to_string(), now);
    }

    /// Record any inbound message from the device
    pub fn record_activity(&self, device_id: &str, now: Instant) {
        self.activities.insert(device_id.to_string(), now);
    }

    /// Mark that a connection configuration has been issued for the device
    ///
    /// Registration is independent of current liveness and never expires.
    pub fn mark_registered(&self, device_id: &str) {
        self.registered.insert(device_id.to_string());
    }

    pub fn is_registered(&self, device_id: &str) -> bool {
        self.registered.contains(device_id)
    }

    /// Derive the device's status at `now`
    pub fn status_at(&self, device_id: &str, now: Instant) -> DeviceStatus {
        if self.is_fresh(&self.heartbeats, device_id, now, self.heartbeat_window) {
            return DeviceStatus::Online;
        }

        let registered = self.registered.contains(device_id);
        if registered && self.is_fresh(&self.activities, device_id, now, self.activity_window) {
            return DeviceStatus::Online;
        }

        if registered {
            DeviceStatus::Offline
        } else {
            DeviceStatus::NoDevice
        }
    }

    /// Derive the device's current status
    pub fn status(&self, device_id: &str) -> DeviceStatus {
        self.status_at(device_id, Instant::now())
    }

    /// Derive statuses for a batch of devices in one pass
    pub fn status_batch(
        &self,
        device_ids: &[String],
    ) -> std::collections::HashMap<String, DeviceStatus> {
        let now = Instant::now();
        device_ids
            .iter()
            .map(|id| (id.clone(), self.status_at(id, now)))
            .collect()
    }

    /// Drop timestamps that can no longer influence any status derivation
    pub fn sweep(&self, now: Instant) -> usize {
        let hb_window = self.heartbeat_window;
        let act_window = self.activity_window;
        let before = self.heartbeats.len() + self.activities.len();
        self.heartbeats
            .retain(|_, at| now.duration_since(*at) < hb_window);
        self.activities
            .retain(|_, at| now.duration_since(*at) < act_window);
        before - (self.heartbeats.len() + self.activities.len())
    }

    fn is_fresh(
        &self,
        store: &DashMap<String, Instant>,
        device_id: &str,
        now: Instant,
        window: Duration,
    ) -> bool {
        store
            .get(device_id)
            .map(|at| now.duration_since(*at) < window)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> LivenessTracker {
        LivenessTracker::new(Duration::from_secs(120), Duration::from_secs(300))
    }

    #[test]
    fn test_unknown_device_is_no_device() {
        assert_eq!(tracker().status("ST001"), DeviceStatus::NoDevice);
    }

    #[test]
    fn test_heartbeat_makes_online() {
        let t = tracker();
        let now = Instant::now();
        t.record_heartbeat("ST001", now);

        // Online for the whole heartbeat window, registered or not
        assert_eq!(t.status_at("ST001", now), DeviceStatus::Online);
        assert_eq!(
            t.status_at("ST001", now + Duration::from_secs(119)),
            DeviceStatus::Online
        );
    }

    #[test]
    fn test_stale_heartbeat_degrades() {
        let t = tracker();
        let now = Instant::now();
        t.record_heartbeat("ST001", now);

        let later = now + Duration::from_secs(121);
        // Never registered: falls all the way back to NO_DEVICE
        assert_eq!(t.status_at("ST001", later), DeviceStatus::NoDevice);

        t.mark_registered("ST001");
        // Only explicit activity records count toward the activity window
        assert_eq!(t.status_at("ST001", later), DeviceStatus::Offline);
    }

    #[test]
    fn test_registered_with_activity_is_online() {
        let t = tracker();
        let now = Instant::now();
        t.mark_registered("ST001");
        t.record_activity("ST001", now);

        assert_eq!(
            t.status_at("ST001", now + Duration::from_secs(299)),
            DeviceStatus::Online
        );
        assert_eq!(
            t.status_at("ST001", now + Duration::from_secs(301)),
            DeviceStatus::Offline
        );
    }

    #[test]
    fn test_activity_without_registration_is_not_online() {
        let t = tracker();
        let now = Instant::now();
        t.record_activity("ST001", now);
        assert_eq!(t.status_at("ST001", now), DeviceStatus::NoDevice);
    }

    #[test]
    fn test_status_batch() {
        let t = tracker();
        let now = Instant::now();
        t.record_heartbeat("ST001", now);
        t.mark_registered("ST002");

        let ids = vec!["ST001".to_string(), "ST002".to_string(), "ST003".to_string()];
        let statuses = t.status_batch(&ids);
        assert_eq!(statuses["ST001"], DeviceStatus::Online);
        assert_eq!(statuses["ST002"], DeviceStatus::Offline);
        assert_eq!(statuses["ST003"], DeviceStatus::NoDevice);
    }

    #[test]
    fn test_sweep_drops_stale_entries() {
        let t = tracker();
        let now = Instant::now();
        t.record_heartbeat("ST001", now);
        t.record_activity("ST001", now);

        assert_eq!(t.sweep(now), 0);
        assert_eq!(t.sweep(now + Duration::from_secs(121)), 1);
        assert_eq!(t.sweep(now + Duration::from_secs(301)), 1);
    }
}
