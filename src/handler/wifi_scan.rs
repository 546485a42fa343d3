//! WIFI_SCAN (0xCF) reply handler

use rentbox_protocol::messages::WifiScanReply;
use rentbox_protocol::{cmd, Frame};
use serde_json::json;
use tracing::warn;

use super::{deposit_reply, log_transaction, CommandHandler, HandlerContext};
use crate::mailbox::CommandClass;

/// Handles the network list a station sends in reply to a WiFi scan
pub struct WifiScanHandler;

impl CommandHandler for WifiScanHandler {
    fn code(&self) -> u8 {
        cmd::WIFI_SCAN
    }

    fn name(&self) -> &'static str {
        "WIFI_SCAN"
    }

    fn mailbox_class(&self) -> Option<CommandClass> {
        Some(CommandClass::WifiScan)
    }

    fn handle(&self, device_id: &str, frame: &Frame, ctx: &HandlerContext) {
        if !deposit_reply(ctx, device_id, CommandClass::WifiScan, self.name(), frame) {
            return;
        }

        match WifiScanReply::parse(frame) {
            Ok(reply) => {
                log_transaction(ctx, device_id, frame, Some(json!({ "ssids": reply.ssids })));
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "failed to parse WIFI_SCAN reply");
                log_transaction(ctx, device_id, frame, None);
            }
        }
    }
}
