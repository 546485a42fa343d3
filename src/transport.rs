//! MQTT transport supervision
//!
//! Owns the broker connection, topic subscriptions, reconnection, and the
//! routing of inbound messages into the liveness tracker and the command
//! registry. The receive loop is the only place device traffic enters the
//! gateway; it must never block and never die on malformed input.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use rentbox_protocol::frame::peek_command;
use rentbox_protocol::{cmd, Frame};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bridge::CommandPublisher;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::handler::CommandRegistry;
use crate::liveness::LivenessTracker;

/// Connection state of the broker link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Inbound topic subtype, last segment of `{ns}/{device}/{subtype}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSubtype {
    /// Command replies and unsolicited events
    Upload,
    /// Firmware/config state pushes
    Update,
    /// Explicit liveness signal
    Heartbeat,
}

/// Supervises the MQTT connection and routes inbound device messages
pub struct TransportSupervisor {
    client: AsyncClient,
    state: Arc<RwLock<LinkState>>,
    namespace: String,
}

impl TransportSupervisor {
    /// Connect to the broker and start the supervision loop
    pub fn start(
        config: &GatewayConfig,
        registry: Arc<CommandRegistry>,
        liveness: Arc<LivenessTracker>,
    ) -> Arc<Self> {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(60));
        if !config.username.is_empty() {
            options.set_credentials(&config.username, &config.password);
        }
        if config.tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, event_loop) = AsyncClient::new(options, 100);
        let supervisor = Arc::new(Self {
            client,
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            namespace: config.topic_namespace.clone(),
        });

        let loop_supervisor = supervisor.clone();
        let reconnect_delay = config.reconnect_delay;
        tokio::spawn(async move {
            loop_supervisor
                .run(event_loop, registry, liveness, reconnect_delay)
                .await;
        });

        supervisor
    }

    /// Current link state
    pub async fn state(&self) -> LinkState {
        *self.state.read().await
    }

    /// Receive loop: drives the event loop forever, reconnecting on loss
    async fn run(
        &self,
        mut event_loop: EventLoop,
        registry: Arc<CommandRegistry>,
        liveness: Arc<LivenessTracker>,
        reconnect_delay: Duration,
    ) {
        *self.state.write().await = LinkState::Connecting;

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("broker connected");
                    *self.state.write().await = LinkState::Connected;
                    if let Err(e) = self.subscribe_inbound().await {
                        warn!(error = %e, "subscribe failed, forcing reconnect");
                        *self.state.write().await = LinkState::Connecting;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    route_inbound(
                        &registry,
                        &liveness,
                        &self.namespace,
                        &publish.topic,
                        &publish.payload,
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "connection lost, reconnecting");
                    *self.state.write().await = LinkState::Connecting;
                    tokio::time::sleep(reconnect_delay).await;
                }
            }
        }
    }

    /// (Re-)subscribe to the fixed set of inbound topic patterns
    async fn subscribe_inbound(&self) -> Result<(), rumqttc::ClientError> {
        for subtype in ["upload", "update", "heartbeat"] {
            let pattern = format!("{}/+/{}", self.namespace, subtype);
            self.client.subscribe(&pattern, QoS::AtLeastOnce).await?;
            info!(topic = pattern, "subscribed");
        }
        Ok(())
    }
}

#[async_trait]
impl CommandPublisher for TransportSupervisor {
    async fn publish(&self, topic: &str, payload: Bytes, qos: u8) -> Result<(), GatewayError> {
        if *self.state.read().await != LinkState::Connected {
            return Err(GatewayError::Transport("MQTT client not connected".into()));
        }
        self.client
            .publish(topic, map_qos(qos), false, payload)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

fn map_qos(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Route one inbound message: liveness first, then decode and dispatch
///
/// Every message from a device counts as activity; the heartbeat subtype
/// additionally refreshes the heartbeat timestamp. Decode failures are
/// logged with the offending hex and dropped — they never propagate.
pub(crate) fn route_inbound(
    registry: &CommandRegistry,
    liveness: &LivenessTracker,
    namespace: &str,
    topic: &str,
    payload: &[u8],
) {
    let (device_id, subtype) = match parse_topic(namespace, topic) {
        Some(parsed) => parsed,
        None => {
            debug!(topic, "ignoring message on unrecognized topic");
            return;
        }
    };

    let now = Instant::now();
    liveness.record_activity(&device_id, now);
    if subtype == MessageSubtype::Heartbeat {
        liveness.record_heartbeat(&device_id, now);
        debug!(device = %device_id, "heartbeat received");
    }

    // Route on the command byte before paying for full validation
    if let Some(code) = peek_command(payload) {
        if !registry.has_handler(code) {
            debug!(
                device = %device_id,
                command = cmd::name(code),
                code = format!("0x{:02X}", code),
                "no handler for inbound command, dropping"
            );
            return;
        }
    }

    match Frame::decode(payload) {
        Ok(frame) => {
            registry.dispatch(&device_id, &frame);
        }
        Err(e) => {
            // Heartbeat payloads are often not frames at all; that's fine
            if subtype == MessageSubtype::Heartbeat {
                debug!(device = %device_id, error = %e, "heartbeat payload is not a frame");
            } else {
                warn!(
                    device = %device_id,
                    error = %e,
                    raw = hex::encode_upper(payload),
                    "dropping undecodable frame"
                );
            }
        }
    }
}

/// Extract `(device_id, subtype)` from `{namespace}/{device}/{subtype}`
fn parse_topic(namespace: &str, topic: &str) -> Option<(String, MessageSubtype)> {
    let mut parts = topic.split('/');
    if parts.next()? != namespace {
        return None;
    }
    let device_id = parts.next()?;
    let subtype = match parts.next()? {
        "upload" => MessageSubtype::Upload,
        "update" => MessageSubtype::Update,
        "heartbeat" => MessageSubtype::Heartbeat,
        _ => return None,
    };
    if device_id.is_empty() || parts.next().is_some() {
        return None;
    }
    Some((device_id.to_string(), subtype))
}
