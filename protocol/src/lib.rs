//! Rentbox Shared Protocol Types
//!
//! This crate provides the binary frame codec and the typed wire messages
//! exchanged between battery-rental stations and the gateway.

pub mod frame;
pub mod messages;

use std::time::{SystemTime, UNIX_EPOCH};

pub use frame::{Frame, FrameError};

/// Get current timestamp in seconds since Unix epoch
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Command codes understood by the station firmware
pub mod cmd {
    /// Slot/powerbank status report (reply to CHECK and CHECK_ALL)
    pub const CHECK: u8 = 0x10;
    /// Eject by pinboard/slot index (request and reply share the code)
    pub const POPUP_BY_INDEX: u8 = 0x21;
    /// Eject by powerbank serial number (request)
    pub const POPUP_BY_SN_REQUEST: u8 = 0x30;
    /// Eject by powerbank serial number (reply)
    pub const POPUP_BY_SN: u8 = 0x31;
    /// Powerbank returned to a slot (unsolicited)
    pub const RETURN: u8 = 0x40;
    /// WiFi network scan result (reply)
    pub const WIFI_SCAN: u8 = 0xCF;

    /// Whether the codec recognizes this command byte
    pub fn is_known(code: u8) -> bool {
        matches!(
            code,
            CHECK | POPUP_BY_INDEX | POPUP_BY_SN_REQUEST | POPUP_BY_SN | RETURN | WIFI_SCAN
        )
    }

    /// Human-readable command name for logging
    pub fn name(code: u8) -> &'static str {
        match code {
            CHECK => "CHECK",
            POPUP_BY_INDEX => "POPUP_BY_INDEX",
            POPUP_BY_SN_REQUEST => "POPUP_BY_SN_REQ",
            POPUP_BY_SN => "POPUP_BY_SN",
            RETURN => "RETURN",
            WIFI_SCAN => "WIFI_SCAN",
            _ => "UNKNOWN",
        }
    }
}

/// Timing parameters shared between the gateway and its callers
pub mod timing {
    use std::time::Duration;

    /// Freshness window for explicit heartbeat messages
    pub const HEARTBEAT_WINDOW: Duration = Duration::from_secs(120);

    /// Freshness window for any inbound device activity
    pub const ACTIVITY_WINDOW: Duration = Duration::from_secs(300);

    /// Mailbox polling interval used by the request/response bridge
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Reply deadline for status checks
    pub const CHECK_TIMEOUT: Duration = Duration::from_secs(10);

    /// Reply deadline for eject commands
    pub const POPUP_TIMEOUT: Duration = Duration::from_secs(15);

    /// Reply deadline for WiFi scans
    pub const WIFI_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

    /// Most-recent transaction records kept per device
    pub const AUDIT_CAP_PER_DEVICE: usize = 50;

    /// Transaction records older than this are dropped
    pub const AUDIT_TTL: Duration = Duration::from_secs(30 * 60);
}
