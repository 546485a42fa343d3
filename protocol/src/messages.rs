//! Typed wire messages: outbound request builders and inbound reply parsers
//!
//! Payload offsets follow the station firmware conventions. Serial numbers
//! travel as 4-byte little-endian integers and are rendered to callers as
//! their decimal string (the form printed on the powerbank label).

use bytes::Bytes;
use thiserror::Error;

use crate::cmd;
use crate::frame::{Frame, FrameError};

/// Slot status byte meaning "powerbank present and ready"
pub const SLOT_STATUS_OK: u8 = 0x01;

/// Bytes per slot record in a CHECK reply payload
const SLOT_RECORD_LEN: usize = 8;

/// Errors raised while interpreting a validated frame's payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected command: got 0x{actual:02X}, expected 0x{expected:02X}")]
    UnexpectedCommand { expected: u8, actual: u8 },

    #[error("Payload too short for {name}: {len} bytes")]
    ShortPayload { name: &'static str, len: usize },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

fn expect_command(frame: &Frame, expected: u8) -> Result<(), ParseError> {
    if frame.command != expected {
        return Err(ParseError::UnexpectedCommand {
            expected,
            actual: frame.command,
        });
    }
    Ok(())
}

fn read_serial(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

// ---------------------------------------------------------------------------
// Outbound request builders
// ---------------------------------------------------------------------------

/// CHECK request: report occupied slots only
pub fn check_request() -> Result<Frame, FrameError> {
    Frame::new(cmd::CHECK, Bytes::new())
}

/// CHECK_ALL request: report every slot, empty or not
pub fn check_all_request() -> Result<Frame, FrameError> {
    Frame::new(cmd::CHECK, vec![0x01])
}

/// POPUP_BY_SN request: eject the powerbank with the given serial number
pub fn popup_by_sn_request(slot: u8, serial: u32) -> Result<Frame, FrameError> {
    let mut payload = Vec::with_capacity(5);
    payload.push(slot);
    payload.extend_from_slice(&serial.to_le_bytes());
    Frame::new(cmd::POPUP_BY_SN_REQUEST, payload)
}

/// POPUP_BY_INDEX request: eject whatever sits at the given position
pub fn popup_by_index_request(pinboard: u8, slot: u8) -> Result<Frame, FrameError> {
    Frame::new(cmd::POPUP_BY_INDEX, vec![pinboard, slot])
}

/// WIFI_SCAN request: list networks visible to the station
pub fn wifi_scan_request() -> Result<Frame, FrameError> {
    Frame::new(cmd::WIFI_SCAN, Bytes::new())
}

// ---------------------------------------------------------------------------
// Inbound reply types
// ---------------------------------------------------------------------------

/// One slot entry from a CHECK reply
///
/// Wire layout (8 bytes): `[slot][status][charge][serial: u32 LE][temperature]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRecord {
    pub slot: u8,
    pub status: u8,
    pub charge_percent: u8,
    pub serial: u32,
    pub temperature: u8,
}

impl SlotRecord {
    /// A zero serial number means the slot holds no powerbank
    pub fn is_occupied(&self) -> bool {
        self.serial != 0
    }

    pub fn serial_string(&self) -> String {
        self.serial.to_string()
    }
}

/// Parsed CHECK reply: the station's slot inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationReport {
    pub slots: Vec<SlotRecord>,
}

impl StationReport {
    pub fn parse(frame: &Frame) -> Result<Self, ParseError> {
        expect_command(frame, cmd::CHECK)?;
        if frame.payload.len() % SLOT_RECORD_LEN != 0 {
            return Err(ParseError::ShortPayload {
                name: "CHECK",
                len: frame.payload.len(),
            });
        }

        let slots = frame
            .payload
            .chunks_exact(SLOT_RECORD_LEN)
            .map(|rec| SlotRecord {
                slot: rec[0],
                status: rec[1],
                charge_percent: rec[2],
                serial: read_serial(&rec[3..7]),
                temperature: rec[7],
            })
            .collect();

        Ok(Self { slots })
    }

    /// Best occupied slot meeting the minimum charge, if any
    ///
    /// Candidates must hold a powerbank, report an OK status, and be charged
    /// to at least `min_charge` percent; ties resolve to the fullest one.
    pub fn eligible_slot(&self, min_charge: u8) -> Option<&SlotRecord> {
        self.slots
            .iter()
            .filter(|s| s.is_occupied() && s.status == SLOT_STATUS_OK)
            .filter(|s| s.charge_percent >= min_charge)
            .max_by_key(|s| s.charge_percent)
    }
}

/// Parsed POPUP_BY_SN reply
///
/// Wire layout: byte0 = slot, bytes1-4 = serial (u32 LE), byte5 = status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupSnReply {
    pub slot: u8,
    pub serial: u32,
    pub status: u8,
}

impl PopupSnReply {
    pub fn parse(frame: &Frame) -> Result<Self, ParseError> {
        expect_command(frame, cmd::POPUP_BY_SN)?;
        let data = &frame.payload;
        if data.len() < 6 {
            return Err(ParseError::ShortPayload {
                name: "POPUP_BY_SN",
                len: data.len(),
            });
        }
        Ok(Self {
            slot: data[0],
            serial: read_serial(&data[1..5]),
            status: data[5],
        })
    }

    pub fn success(&self) -> bool {
        self.status == SLOT_STATUS_OK
    }

    pub fn serial_string(&self) -> String {
        self.serial.to_string()
    }
}

/// Parsed POPUP_BY_INDEX reply: `[pinboard][slot][status]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupIndexReply {
    pub pinboard: u8,
    pub slot: u8,
    pub status: u8,
}

impl PopupIndexReply {
    pub fn parse(frame: &Frame) -> Result<Self, ParseError> {
        expect_command(frame, cmd::POPUP_BY_INDEX)?;
        let data = &frame.payload;
        if data.len() < 3 {
            return Err(ParseError::ShortPayload {
                name: "POPUP_BY_INDEX",
                len: data.len(),
            });
        }
        Ok(Self {
            pinboard: data[0],
            slot: data[1],
            status: data[2],
        })
    }

    pub fn success(&self) -> bool {
        self.status == SLOT_STATUS_OK
    }
}

/// Parsed RETURN event (unsolicited, sent when a powerbank is inserted)
///
/// Wire layout (10 bytes):
/// `[pinboard][slot][serial: u32 LE][status][_][_][charge]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnEvent {
    pub pinboard: u8,
    pub slot: u8,
    pub serial: u32,
    pub status: u8,
    pub charge_percent: u8,
}

impl ReturnEvent {
    pub fn parse(frame: &Frame) -> Result<Self, ParseError> {
        expect_command(frame, cmd::RETURN)?;
        let data = &frame.payload;
        if data.len() < 10 {
            return Err(ParseError::ShortPayload {
                name: "RETURN",
                len: data.len(),
            });
        }
        Ok(Self {
            pinboard: data[0],
            slot: data[1],
            serial: read_serial(&data[2..6]),
            status: data[6],
            charge_percent: data[9],
        })
    }

    pub fn serial_string(&self) -> String {
        self.serial.to_string()
    }
}

/// Parsed WIFI_SCAN reply
///
/// The payload is a bracketed list of quoted SSIDs, e.g. `["home","shop"]`;
/// unquoted entries are firmware noise and are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiScanReply {
    pub ssids: Vec<String>,
}

impl WifiScanReply {
    pub fn parse(frame: &Frame) -> Result<Self, ParseError> {
        expect_command(frame, cmd::WIFI_SCAN)?;
        let data = &frame.payload;
        if data.len() < 2 {
            return Err(ParseError::ShortPayload {
                name: "WIFI_SCAN",
                len: data.len(),
            });
        }

        let text = String::from_utf8_lossy(&data[1..data.len() - 1]);
        let ssids = text
            .split(',')
            .filter(|e| e.len() >= 2 && e.starts_with('"') && e.ends_with('"'))
            .map(|e| e[1..e.len() - 1].to_string())
            .collect();

        Ok(Self { ssids })
    }
}
