//! End-to-end flow through the public surface: registry dispatch on the
//! receive side, bridge calls on the request side, with a recording
//! publisher standing in for the broker.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use rentbox_gateway::audit::TransactionLog;
use rentbox_gateway::handler::{CommandRegistry, HandlerContext};
use rentbox_gateway::{
    issue_device_config, CommandBridge, CommandPublisher, DeviceStatus, GatewayConfig,
    GatewayError, LivenessTracker, Mailbox,
};
use rentbox_protocol::{cmd, Frame};
use tokio::sync::mpsc;

struct RecordingPublisher {
    published: Mutex<Vec<(String, Bytes)>>,
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

struct World {
    publisher: Arc<RecordingPublisher>,
    liveness: Arc<LivenessTracker>,
    registry: Arc<CommandRegistry>,
    bridge: Arc<CommandBridge>,
    audit: Arc<TransactionLog>,
    config: GatewayConfig,
}

fn world() -> World {
    let config = GatewayConfig::default();
    let publisher = Arc::new(RecordingPublisher {
        published: Mutex::new(Vec::new()),
    });
    let mailbox = Arc::new(Mailbox::new());
    let audit = Arc::new(TransactionLog::new());
    let liveness = Arc::new(LivenessTracker::new(
        config.heartbeat_window,
        config.activity_window,
    ));
    let (returns, _rx) = mpsc::channel(8);
    let registry = Arc::new(CommandRegistry::with_default_handlers(HandlerContext {
        mailbox: mailbox.clone(),
        audit: audit.clone(),
        returns,
    }));
    let bridge = Arc::new(
        CommandBridge::new(
            publisher.clone(),
            mailbox,
            liveness.clone(),
            config.topic_namespace.clone(),
        )
        .with_poll_interval(Duration::from_millis(10)),
    );
    World {
        publisher,
        liveness,
        registry,
        bridge,
        audit,
        config,
    }
}

fn popup_sn_reply(slot: u8, serial: u32, status: u8) -> Frame {
    let mut payload = vec![slot];
    payload.extend_from_slice(&serial.to_le_bytes());
    payload.push(status);
    Frame::new(cmd::POPUP_BY_SN, payload).expect("valid frame")
}

/// A station is onboarded, heartbeats, and serves a popup request whose
/// reply arrives through the same dispatch path real traffic takes.
#[tokio::test]
async fn test_station_popup_end_to_end() {
    let w = world();

    // Onboarding hands out broker coordinates and registers the station
    let issued = issue_device_config(&w.config, &w.liveness, "ST001");
    assert_eq!(issued.command_topic, "device/ST001/command");
    assert_eq!(w.liveness.status("ST001"), DeviceStatus::Offline);

    // First heartbeat brings it online
    w.liveness.record_heartbeat("ST001", Instant::now());
    assert_eq!(w.liveness.status("ST001"), DeviceStatus::Online);

    // Station replies while the bridge is waiting
    let registry = w.registry.clone();
    let responder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(registry.dispatch("ST001", &popup_sn_reply(3, 1234, 0x01)));
    });

    let reply = w
        .bridge
        .popup_by_sn("ST001", 3, 1234)
        .await
        .expect("popup should succeed");
    responder.await.expect("responder task failed");

    assert!(reply.success());
    assert_eq!(reply.slot, 3);
    assert_eq!(reply.serial_string(), "1234");

    // Exactly one command frame went to the station's command topic
    let published = w.publisher.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "device/ST001/command");
    let sent = Frame::decode(&published[0].1).expect("published frame must decode");
    assert_eq!(sent.command, cmd::POPUP_BY_SN_REQUEST);

    // The reply was audited under its command code
    let records = w.audit.recent("ST001", Some("0x31"), 10);
    assert_eq!(records.len(), 1);
}

/// A reply arriving after the deadline is dropped, not delivered late.
#[tokio::test]
async fn test_late_reply_is_dropped() {
    let w = world();
    w.liveness.record_heartbeat("ST001", Instant::now());

    let request = rentbox_protocol::messages::popup_by_sn_request(1, 77).expect("build failed");
    let result = w
        .bridge
        .call(
            "ST001",
            &request,
            rentbox_gateway::CommandClass::PopupSn,
            Duration::from_millis(80),
        )
        .await;
    assert!(matches!(result, Err(GatewayError::Timeout)));

    // The reply shows up after the caller gave up: dispatch succeeds (the
    // handler runs and audits) but nothing is waiting and nothing leaks.
    assert!(w.registry.dispatch("ST001", &popup_sn_reply(1, 77, 0x01)));
    let result = w
        .bridge
        .call(
            "ST001",
            &request,
            rentbox_gateway::CommandClass::PopupSn,
            Duration::from_millis(80),
        )
        .await;
    assert!(
        matches!(result, Err(GatewayError::Timeout)),
        "stale reply must not satisfy a later call"
    );
}

/// An unregistered, silent station is NO_DEVICE; registered but silent is
/// OFFLINE; any request to either is rejected without touching the broker.
#[tokio::test]
async fn test_status_gates_requests() {
    let w = world();

    assert_eq!(w.liveness.status("ghost"), DeviceStatus::NoDevice);
    issue_device_config(&w.config, &w.liveness, "ST002");
    assert_eq!(w.liveness.status("ST002"), DeviceStatus::Offline);

    let result = w.bridge.check("ST002").await;
    assert!(matches!(result, Err(GatewayError::Offline(_))));
    assert!(w.publisher.published.lock().unwrap().is_empty());
}
