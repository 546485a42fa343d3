//! Gateway configuration
//!
//! Everything here is opaque to the core beyond constructing topic strings
//! and broker connection options. Values come from environment variables in
//! production and from `Default` in tests.

use std::env;
use std::time::Duration;

use rentbox_protocol::timing;

/// Configuration for the gateway process
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// MQTT broker host
    pub broker_host: String,
    /// MQTT broker port
    pub broker_port: u16,
    /// Broker username
    pub username: String,
    /// Broker password
    pub password: String,
    /// Connect over TLS
    pub tls: bool,
    /// Client identifier presented to the broker
    pub client_id: String,
    /// Topic namespace prefix shared with the device fleet
    pub topic_namespace: String,
    /// Freshness window for explicit heartbeats
    pub heartbeat_window: Duration,
    /// Freshness window for any device activity
    pub activity_window: Duration,
    /// Mailbox polling interval for the bridge
    pub poll_interval: Duration,
    /// Delay before retrying a lost broker connection
    pub reconnect_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".into(),
            broker_port: 1883,
            username: String::new(),
            password: String::new(),
            tls: false,
            client_id: "rentbox-gateway".into(),
            topic_namespace: "device".into(),
            heartbeat_window: timing::HEARTBEAT_WINDOW,
            activity_window: timing::ACTIVITY_WINDOW,
            poll_interval: timing::POLL_INTERVAL,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from `MQTT_*` environment variables,
    /// falling back to defaults for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            broker_host: env_or("MQTT_BROKER", defaults.broker_host),
            broker_port: env_parsed("MQTT_PORT", defaults.broker_port),
            username: env_or("MQTT_USERNAME", defaults.username),
            password: env_or("MQTT_PASSWORD", defaults.password),
            tls: env_parsed("MQTT_SSL", defaults.tls),
            client_id: env_or("MQTT_CLIENT_ID", defaults.client_id),
            topic_namespace: env_or("MQTT_TOPIC_NAMESPACE", defaults.topic_namespace),
            heartbeat_window: defaults.heartbeat_window,
            activity_window: defaults.activity_window,
            poll_interval: defaults.poll_interval,
            reconnect_delay: defaults.reconnect_delay,
        }
    }
}

/// Broker coordinates handed to a station during onboarding
///
/// Serialized as-is into the onboarding response. The password is only
/// included when the broker requires credentials.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeviceConnectionConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub username: String,
    pub password: String,
    /// Topic the station publishes replies and events to
    pub upload_topic: String,
    /// Topic the station subscribes to for commands
    pub command_topic: String,
    /// Topic the station publishes periodic heartbeats to
    pub heartbeat_topic: String,
}

/// Hand out broker coordinates for one station and mark it registered
///
/// Registration is what separates `Offline` from `NoDevice` in status
/// queries: a station that received its config is expected to show up.
pub fn issue_device_config(
    config: &GatewayConfig,
    liveness: &crate::liveness::LivenessTracker,
    device_id: &str,
) -> DeviceConnectionConfig {
    liveness.mark_registered(device_id);
    let ns = &config.topic_namespace;
    DeviceConnectionConfig {
        host: config.broker_host.clone(),
        port: config.broker_port,
        ssl: config.tls,
        username: config.username.clone(),
        password: config.password.clone(),
        upload_topic: format!("{ns}/{device_id}/upload"),
        command_topic: format!("{ns}/{device_id}/command"),
        heartbeat_topic: format!("{ns}/{device_id}/heartbeat"),
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
