//! Protocol gateway between battery-rental stations and the backend
//!
//! Stations speak a compact binary frame protocol over MQTT. This crate
//! decodes inbound traffic, tracks device liveness, correlates replies to
//! outstanding requests, and exposes typed operations (check, popup,
//! return events, wifi scan) to the rest of the backend.

pub mod audit;
pub mod bridge;
pub mod config;
pub mod error;
pub mod handler;
pub mod liveness;
pub mod mailbox;
pub mod transport;

pub use bridge::{CommandBridge, CommandPublisher};
pub use config::{issue_device_config, DeviceConnectionConfig, GatewayConfig};
pub use error::GatewayError;
pub use handler::{CommandRegistry, HandlerContext, ReturnNotification};
pub use liveness::{DeviceStatus, LivenessTracker};
pub use mailbox::{CommandClass, Mailbox};
