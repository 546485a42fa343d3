//! Command handling for inbound device frames
//!
//! This module handles:
//! - One handler per command code, with a shared contract
//! - Depositing solicited replies into the bridge's mailbox
//! - Appending transaction records for diagnostics
//! - Emitting notifications for unsolicited events (RETURN)

mod check;
mod popup_index;
mod popup_sn;
mod registry;
mod station_return;
mod wifi_scan;

pub use check::CheckHandler;
pub use popup_index::PopupIndexHandler;
pub use popup_sn::PopupSnHandler;
pub use registry::CommandRegistry;
pub use station_return::{ReturnHandler, ReturnNotification};
pub use wifi_scan::WifiScanHandler;

use std::sync::Arc;

use rentbox_protocol::Frame;
use tokio::sync::mpsc;
use tracing::debug;

use crate::audit::{TransactionLog, TransactionRecord};
use crate::mailbox::{CommandClass, Mailbox};

/// Shared services handed to every handler invocation
///
/// Handlers run on the transport's receive path and must not block: every
/// operation reachable from here is an in-memory store write or a
/// non-blocking channel send.
pub struct HandlerContext {
    pub mailbox: Arc<Mailbox>,
    pub audit: Arc<TransactionLog>,
    pub returns: mpsc::Sender<ReturnNotification>,
}

/// Contract implemented once per command code
pub trait CommandHandler: Send + Sync {
    /// Command code this handler processes (e.g. 0x10, 0x31)
    fn code(&self) -> u8;

    /// Human-readable command name for logging
    fn name(&self) -> &'static str;

    /// Mailbox class for solicited replies; `None` for unsolicited events
    fn mailbox_class(&self) -> Option<CommandClass> {
        None
    }

    /// Process a validated frame from the given device
    fn handle(&self, device_id: &str, frame: &Frame, ctx: &HandlerContext);
}

/// Deposit a solicited reply, honoring the waiting-caller contract
///
/// Returns false when nobody is waiting; the reply is logged and dropped,
/// which is expected traffic, not an error.
fn deposit_reply(
    ctx: &HandlerContext,
    device_id: &str,
    class: CommandClass,
    name: &str,
    frame: &Frame,
) -> bool {
    if ctx.mailbox.deposit(device_id, class, frame.clone()) {
        true
    } else {
        debug!(
            device = device_id,
            command = name,
            "reply ignored: no pending request"
        );
        false
    }
}

/// Append an audit record for a handled frame
fn log_transaction(
    ctx: &HandlerContext,
    device_id: &str,
    frame: &Frame,
    parsed: Option<serde_json::Value>,
) {
    ctx.audit.push(
        device_id,
        TransactionRecord::new(frame.command, frame.to_hex(), parsed),
    );
}
