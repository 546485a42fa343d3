//! POPUP_BY_INDEX (0x21) reply handler

use rentbox_protocol::messages::PopupIndexReply;
use rentbox_protocol::{cmd, Frame};
use serde_json::json;
use tracing::warn;

use super::{deposit_reply, log_transaction, CommandHandler, HandlerContext};
use crate::mailbox::CommandClass;

/// Handles the confirmation for position-addressed ejects
pub struct PopupIndexHandler;

impl CommandHandler for PopupIndexHandler {
    fn code(&self) -> u8 {
        cmd::POPUP_BY_INDEX
    }

    fn name(&self) -> &'static str {
        "POPUP_INDEX"
    }

    fn mailbox_class(&self) -> Option<CommandClass> {
        Some(CommandClass::PopupIndex)
    }

    fn handle(&self, device_id: &str, frame: &Frame, ctx: &HandlerContext) {
        if !deposit_reply(ctx, device_id, CommandClass::PopupIndex, self.name(), frame) {
            return;
        }

        match PopupIndexReply::parse(frame) {
            Ok(reply) => {
                log_transaction(
                    ctx,
                    device_id,
                    frame,
                    Some(json!({
                        "pinboard": reply.pinboard,
                        "slot": reply.slot,
                        "status": reply.status,
                        "success": reply.success(),
                    })),
                );
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "failed to parse POPUP_INDEX reply");
                log_transaction(ctx, device_id, frame, None);
            }
        }
    }
}
