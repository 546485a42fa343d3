//! POPUP_BY_SN (0x31) reply handler

use rentbox_protocol::messages::PopupSnReply;
use rentbox_protocol::{cmd, Frame};
use serde_json::json;
use tracing::{info, warn};

use super::{deposit_reply, log_transaction, CommandHandler, HandlerContext};
use crate::mailbox::CommandClass;

/// Handles the eject confirmation a station sends after a POPUP_BY_SN request
pub struct PopupSnHandler;

impl CommandHandler for PopupSnHandler {
    fn code(&self) -> u8 {
        cmd::POPUP_BY_SN
    }

    fn name(&self) -> &'static str {
        "POPUP_SN"
    }

    fn mailbox_class(&self) -> Option<CommandClass> {
        Some(CommandClass::PopupSn)
    }

    fn handle(&self, device_id: &str, frame: &Frame, ctx: &HandlerContext) {
        if !deposit_reply(ctx, device_id, CommandClass::PopupSn, self.name(), frame) {
            return;
        }

        match PopupSnReply::parse(frame) {
            Ok(reply) => {
                if reply.success() {
                    info!(
                        device = device_id,
                        slot = reply.slot,
                        serial = %reply.serial_string(),
                        "popup succeeded"
                    );
                } else {
                    warn!(
                        device = device_id,
                        status = format!("0x{:02X}", reply.status),
                        "popup failed"
                    );
                }
                log_transaction(
                    ctx,
                    device_id,
                    frame,
                    Some(json!({
                        "slot": reply.slot,
                        "serial": reply.serial_string(),
                        "status": reply.status,
                        "success": reply.success(),
                    })),
                );
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "failed to parse POPUP_SN reply");
                log_transaction(ctx, device_id, frame, None);
            }
        }
    }
}
