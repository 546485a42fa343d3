//! Request/response bridge over the pub/sub transport
//!
//! Callers get ordinary request/response semantics: `call` publishes a
//! command frame to the device and polls the mailbox until the transport's
//! receive path deposits the reply, or the deadline elapses. The poll-sleep
//! loop costs one extra scheduling hop but needs no per-request callback
//! wiring; it must run on a task distinct from the transport's receive path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rentbox_protocol::messages::{
    self, PopupIndexReply, PopupSnReply, StationReport, WifiScanReply,
};
use rentbox_protocol::{timing, Frame};
use tokio::time::Instant;
use tracing::debug;

use crate::error::GatewayError;
use crate::liveness::{DeviceStatus, LivenessTracker};
use crate::mailbox::{CommandClass, Mailbox};

/// Outbound seam of the transport supervisor
///
/// The bridge only ever publishes; a recording implementation stands in for
/// the broker in tests.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Publish raw bytes to a topic; fails when the transport is down
    async fn publish(&self, topic: &str, payload: Bytes, qos: u8) -> Result<(), GatewayError>;
}

/// Issues commands to stations and waits for the correlated reply
pub struct CommandBridge {
    publisher: Arc<dyn CommandPublisher>,
    mailbox: Arc<Mailbox>,
    liveness: Arc<LivenessTracker>,
    topic_namespace: String,
    poll_interval: Duration,
}

impl CommandBridge {
    pub fn new(
        publisher: Arc<dyn CommandPublisher>,
        mailbox: Arc<Mailbox>,
        liveness: Arc<LivenessTracker>,
        topic_namespace: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            mailbox,
            liveness,
            topic_namespace: topic_namespace.into(),
            poll_interval: timing::POLL_INTERVAL,
        }
    }

    /// Override the mailbox polling interval (tests)
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Send a command frame and wait for the device's reply
    ///
    /// Rejects immediately with `Offline` when the device is not ONLINE —
    /// no publish is attempted. Otherwise the mailbox slot for
    /// `(device, class)` is created (overwriting any stale one), the frame
    /// goes out on the device's command topic, and the slot is polled until
    /// filled or the deadline passes. The slot is always gone afterwards.
    pub async fn call(
        &self,
        device_id: &str,
        frame: &Frame,
        class: CommandClass,
        timeout: Duration,
    ) -> Result<Frame, GatewayError> {
        if self.liveness.status(device_id) != DeviceStatus::Online {
            return Err(GatewayError::Offline(device_id.to_string()));
        }

        self.mailbox.open(device_id, class, timeout);

        let topic = command_topic(&self.topic_namespace, device_id);
        if let Err(e) = self.publisher.publish(&topic, frame.encode(), 1).await {
            self.mailbox.close(device_id, class);
            return Err(e);
        }
        debug!(device = device_id, class = %class, "command published, awaiting reply");

        let deadline = Instant::now() + timeout;
        loop {
            tokio::time::sleep(self.poll_interval.min(deadline - Instant::now())).await;

            if let Some(reply) = self.mailbox.take(device_id, class) {
                return Ok(reply);
            }
            if Instant::now() >= deadline {
                self.mailbox.close(device_id, class);
                return Err(GatewayError::Timeout);
            }
        }
    }

    /// CHECK: report of occupied slots
    pub async fn check(&self, device_id: &str) -> Result<StationReport, GatewayError> {
        let request = messages::check_request()?;
        let reply = self
            .call(device_id, &request, CommandClass::Check, timing::CHECK_TIMEOUT)
            .await?;
        Ok(StationReport::parse(&reply)?)
    }

    /// CHECK_ALL: report of every slot, empty or not
    pub async fn check_all(&self, device_id: &str) -> Result<StationReport, GatewayError> {
        let request = messages::check_all_request()?;
        let reply = self
            .call(device_id, &request, CommandClass::Check, timing::CHECK_TIMEOUT)
            .await?;
        Ok(StationReport::parse(&reply)?)
    }

    /// Eject the powerbank with the given serial number
    pub async fn popup_by_sn(
        &self,
        device_id: &str,
        slot: u8,
        serial: u32,
    ) -> Result<PopupSnReply, GatewayError> {
        let request = messages::popup_by_sn_request(slot, serial)?;
        let reply = self
            .call(device_id, &request, CommandClass::PopupSn, timing::POPUP_TIMEOUT)
            .await?;
        Ok(PopupSnReply::parse(&reply)?)
    }

    /// Eject whatever sits at the given position
    pub async fn popup_by_index(
        &self,
        device_id: &str,
        pinboard: u8,
        slot: u8,
    ) -> Result<PopupIndexReply, GatewayError> {
        let request = messages::popup_by_index_request(pinboard, slot)?;
        let reply = self
            .call(
                device_id,
                &request,
                CommandClass::PopupIndex,
                timing::POPUP_TIMEOUT,
            )
            .await?;
        Ok(PopupIndexReply::parse(&reply)?)
    }

    /// Eject an eligible powerbank charged to at least `min_charge` percent
    ///
    /// Composes CHECK and POPUP_BY_SN; an inventory with no eligible slot is
    /// `NoEligibleSlot`, distinct from a timeout.
    pub async fn popup_eligible(
        &self,
        device_id: &str,
        min_charge: u8,
    ) -> Result<PopupSnReply, GatewayError> {
        let report = self.check(device_id).await?;
        let candidate = report
            .eligible_slot(min_charge)
            .ok_or(GatewayError::NoEligibleSlot)?;
        self.popup_by_sn(device_id, candidate.slot, candidate.serial)
            .await
    }

    /// List WiFi networks visible to the station
    pub async fn wifi_scan(&self, device_id: &str) -> Result<WifiScanReply, GatewayError> {
        let request = messages::wifi_scan_request()?;
        let reply = self
            .call(
                device_id,
                &request,
                CommandClass::WifiScan,
                timing::WIFI_SCAN_TIMEOUT,
            )
            .await?;
        Ok(WifiScanReply::parse(&reply)?)
    }
}

/// Topic a station listens on for commands
pub fn command_topic(namespace: &str, device_id: &str) -> String {
    format!("{}/{}/command", namespace, device_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentbox_protocol::cmd;
    use std::sync::Mutex;
    use std::time::Instant as StdInstant;

    /// Records publishes instead of talking to a broker
    struct RecordingPublisher {
        published: Mutex<Vec<(String, Bytes)>>,
    }

    impl RecordingPublisher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                published: Mutex::new(Vec::new()),
            })
        }

        fn publish_count(&self) -> usize {
            self.published.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CommandPublisher for RecordingPublisher {
        async fn publish(&self, topic: &str, payload: Bytes, _qos: u8) -> Result<(), GatewayError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        }
    }

    struct Harness {
        publisher: Arc<RecordingPublisher>,
        mailbox: Arc<Mailbox>,
        liveness: Arc<LivenessTracker>,
        bridge: CommandBridge,
    }

    fn harness() -> Harness {
        let publisher = RecordingPublisher::new();
        let mailbox = Arc::new(Mailbox::new());
        let liveness = Arc::new(LivenessTracker::new(
            Duration::from_secs(120),
            Duration::from_secs(300),
        ));
        let bridge = CommandBridge::new(
            publisher.clone(),
            mailbox.clone(),
            liveness.clone(),
            "device",
        )
        .with_poll_interval(Duration::from_millis(10));
        Harness {
            publisher,
            mailbox,
            liveness,
            bridge,
        }
    }

    fn popup_reply_frame(serial: u32) -> Frame {
        let mut payload = vec![0x02];
        payload.extend_from_slice(&serial.to_le_bytes());
        payload.push(0x01);
        Frame::new(cmd::POPUP_BY_SN, payload).expect("valid frame")
    }

    #[tokio::test]
    async fn test_offline_short_circuit() {
        let h = harness();

        let request = messages::check_request().expect("build failed");
        let result = h
            .bridge
            .call("ST001", &request, CommandClass::Check, Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(GatewayError::Offline(_))));
        // No network call was attempted
        assert_eq!(h.publisher.publish_count(), 0);
        assert!(h.mailbox.is_empty());
    }

    #[tokio::test]
    async fn test_call_returns_deposited_reply() {
        let h = harness();
        h.liveness.record_heartbeat("ST001", StdInstant::now());

        let mailbox = h.mailbox.clone();
        let waiter = tokio::spawn(async move {
            // Simulate the transport receive path depositing the reply
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert!(mailbox.deposit("ST001", CommandClass::PopupSn, popup_reply_frame(1234)));
        });

        let reply = h
            .bridge
            .popup_by_sn("ST001", 2, 1234)
            .await
            .expect("call should succeed");
        assert_eq!(reply.serial_string(), "1234");
        assert!(reply.success());
        waiter.await.expect("deposit task failed");

        // Published to the device command topic, slot consumed
        let published = h.publisher.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "device/ST001/command");
        assert!(h.mailbox.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_without_reply() {
        let h = harness();
        h.liveness.record_heartbeat("ST001", StdInstant::now());

        let request = messages::check_request().expect("build failed");
        let started = StdInstant::now();
        let result = h
            .bridge
            .call(
                "ST001",
                &request,
                CommandClass::Check,
                Duration::from_millis(100),
            )
            .await;

        assert!(matches!(result, Err(GatewayError::Timeout)));
        // Within deadline plus polling granularity, and the slot is gone
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(h.mailbox.is_empty());
    }

    #[tokio::test]
    async fn test_popup_eligible_no_candidate() {
        let h = harness();
        h.liveness.record_heartbeat("ST001", StdInstant::now());

        let mailbox = h.mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            // Inventory with a single half-empty powerbank
            let mut payload = vec![0x01, 0x01, 30];
            payload.extend_from_slice(&1234u32.to_le_bytes());
            payload.push(25);
            let frame = Frame::new(cmd::CHECK, payload).expect("valid frame");
            mailbox.deposit("ST001", CommandClass::Check, frame);
        });

        let result = h.bridge.popup_eligible("ST001", 80).await;
        assert!(matches!(result, Err(GatewayError::NoEligibleSlot)));

        // Only the CHECK went out, never a popup
        assert_eq!(h.publisher.publish_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_different_keys() {
        let h = harness();
        h.liveness.record_heartbeat("ST001", StdInstant::now());
        h.liveness.record_heartbeat("ST002", StdInstant::now());

        let mailbox = h.mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            mailbox.deposit("ST001", CommandClass::PopupSn, popup_reply_frame(111));
            mailbox.deposit("ST002", CommandClass::PopupSn, popup_reply_frame(222));
        });

        let (a, b) = tokio::join!(
            h.bridge.popup_by_sn("ST001", 1, 111),
            h.bridge.popup_by_sn("ST002", 1, 222),
        );
        assert_eq!(a.expect("ST001 call failed").serial, 111);
        assert_eq!(b.expect("ST002 call failed").serial, 222);
    }
}
