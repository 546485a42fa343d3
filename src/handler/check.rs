//! CHECK (0x10) reply handler

use rentbox_protocol::messages::StationReport;
use rentbox_protocol::{cmd, Frame};
use serde_json::json;
use tracing::warn;

use super::{deposit_reply, log_transaction, CommandHandler, HandlerContext};
use crate::mailbox::CommandClass;

/// Handles the slot inventory a station sends in reply to CHECK/CHECK_ALL
pub struct CheckHandler;

impl CommandHandler for CheckHandler {
    fn code(&self) -> u8 {
        cmd::CHECK
    }

    fn name(&self) -> &'static str {
        "CHECK"
    }

    fn mailbox_class(&self) -> Option<CommandClass> {
        Some(CommandClass::Check)
    }

    fn handle(&self, device_id: &str, frame: &Frame, ctx: &HandlerContext) {
        if !deposit_reply(ctx, device_id, CommandClass::Check, self.name(), frame) {
            return;
        }

        match StationReport::parse(frame) {
            Ok(report) => {
                let slots: Vec<_> = report
                    .slots
                    .iter()
                    .map(|s| {
                        json!({
                            "slot": s.slot,
                            "status": s.status,
                            "charge": s.charge_percent,
                            "serial": s.serial_string(),
                            "temperature": s.temperature,
                        })
                    })
                    .collect();
                log_transaction(ctx, device_id, frame, Some(json!({ "slots": slots })));
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "failed to parse CHECK reply");
                log_transaction(ctx, device_id, frame, None);
            }
        }
    }
}
