//! RETURN (0x40) event handler
//!
//! RETURN is unsolicited: the station sends it on its own when a powerbank
//! is inserted, so there is never a waiting caller. Beyond the audit record,
//! the event is forwarded to an external notification channel (order
//! settlement lives outside the gateway core).

use rentbox_protocol::messages::ReturnEvent;
use rentbox_protocol::{cmd, Frame};
use serde_json::json;
use tracing::{info, warn};

use super::{log_transaction, CommandHandler, HandlerContext};

/// Notification emitted when a powerbank comes back to a station
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnNotification {
    pub device_id: String,
    pub slot: u8,
    pub serial: String,
    pub battery_level: u8,
}

/// Handles unsolicited powerbank-return events
pub struct ReturnHandler;

impl CommandHandler for ReturnHandler {
    fn code(&self) -> u8 {
        cmd::RETURN
    }

    fn name(&self) -> &'static str {
        "RETURN"
    }

    fn handle(&self, device_id: &str, frame: &Frame, ctx: &HandlerContext) {
        let event = match ReturnEvent::parse(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(device = device_id, error = %e, "failed to parse RETURN event");
                log_transaction(ctx, device_id, frame, None);
                return;
            }
        };

        info!(
            device = device_id,
            slot = event.slot,
            serial = %event.serial_string(),
            charge = event.charge_percent,
            "powerbank returned"
        );

        log_transaction(
            ctx,
            device_id,
            frame,
            Some(json!({
                "pinboard": event.pinboard,
                "slot": event.slot,
                "serial": event.serial_string(),
                "status": event.status,
                "charge": event.charge_percent,
            })),
        );

        let notification = ReturnNotification {
            device_id: device_id.to_string(),
            slot: event.slot,
            serial: event.serial_string(),
            battery_level: event.charge_percent,
        };

        // Receive path must not block: a full channel drops the event
        if let Err(e) = ctx.returns.try_send(notification) {
            warn!(device = device_id, error = %e, "return notification dropped");
        }
    }
}
