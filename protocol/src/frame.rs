//! Binary frame codec for station communication
//!
//! All messages are framed as:
//! ```text
//! [ 1 byte: marker 0xA8 ][ 2 bytes: length (u16, big-endian) ][ 1 byte: command ][ N bytes: payload ][ 1 byte: checksum ]
//! ```
//!
//! The length field counts the whole frame, so `N = length - 5`. The
//! checksum is the low byte of the sum of every preceding byte and is a
//! bit-exact contract with the station firmware.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::cmd;

/// Sentinel byte that starts every frame
pub const FRAME_MARKER: u8 = 0xA8;

/// Marker + length field + command + checksum
pub const FRAME_OVERHEAD: usize = 5;

/// Maximum payload size representable by the u16 length field
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize - FRAME_OVERHEAD;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Bad frame marker: 0x{0:02X} (expected 0xA8)")]
    BadMarker(u8),

    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Length mismatch: length field says {declared}, frame has {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Checksum mismatch: computed 0x{computed:02X}, frame carries 0x{carried:02X}")]
    ChecksumMismatch { computed: u8, carried: u8 },

    #[error("Unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),

    #[error("Payload too large: {0} bytes (max: {MAX_PAYLOAD_SIZE})")]
    PayloadTooLarge(usize),
}

/// One validated protocol message exchanged with a station
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: u8,
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame for a known command, validating the payload size
    pub fn new(command: u8, payload: impl Into<Bytes>) -> Result<Self, FrameError> {
        if !cmd::is_known(command) {
            return Err(FrameError::UnknownCommand(command));
        }
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { command, payload })
    }

    /// Encode this frame into wire bytes (deterministic inverse of `decode`)
    pub fn encode(&self) -> Bytes {
        let total = self.payload.len() + FRAME_OVERHEAD;
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(FRAME_MARKER);
        buf.put_u16(total as u16);
        buf.put_u8(self.command);
        buf.put_slice(&self.payload);
        buf.put_u8(checksum(&buf));
        buf.freeze()
    }

    /// Decode and validate a complete frame from wire bytes
    ///
    /// Marker, length consistency, checksum, and command code are all
    /// checked before any field is exposed; a violation of any of them is
    /// a decode failure, never a partial parse.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(FrameError::Truncated {
                needed: FRAME_OVERHEAD,
                available: bytes.len(),
            });
        }
        if bytes[0] != FRAME_MARKER {
            return Err(FrameError::BadMarker(bytes[0]));
        }

        let declared = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
        if declared > bytes.len() {
            return Err(FrameError::Truncated {
                needed: declared,
                available: bytes.len(),
            });
        }
        if declared != bytes.len() {
            return Err(FrameError::LengthMismatch {
                declared,
                actual: bytes.len(),
            });
        }

        let carried = bytes[declared - 1];
        let computed = checksum(&bytes[..declared - 1]);
        if carried != computed {
            return Err(FrameError::ChecksumMismatch { computed, carried });
        }

        let command = bytes[3];
        if !cmd::is_known(command) {
            return Err(FrameError::UnknownCommand(command));
        }

        Ok(Self {
            command,
            payload: Bytes::copy_from_slice(&bytes[4..declared - 1]),
        })
    }

    /// Render the encoded frame as an uppercase hex string (for audit logs)
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.encode())
    }
}

/// Cheap extraction of the command byte without full validation
///
/// Used to route a message before a handler is selected. Returns `None`
/// when the buffer is too short to carry a command byte.
pub fn peek_command(bytes: &[u8]) -> Option<u8> {
    if bytes.len() < 4 || bytes[0] != FRAME_MARKER {
        return None;
    }
    Some(bytes[3])
}

/// Firmware checksum: low byte of the sum of all bytes
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        Frame::new(cmd::POPUP_BY_SN, vec![0x02, 0xD2, 0x04, 0x00, 0x00, 0x01])
            .expect("valid frame")
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = sample_frame();
        let encoded = original.encode();

        // Length field covers the whole frame
        let declared = u16::from_be_bytes([encoded[1], encoded[2]]) as usize;
        assert_eq!(declared, encoded.len());

        let decoded = Frame::decode(&encoded).expect("decode failed");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let frame = Frame::new(cmd::CHECK, Vec::new()).expect("valid frame");
        let decoded = Frame::decode(&frame.encode()).expect("decode failed");
        assert_eq!(decoded.command, cmd::CHECK);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_bad_marker_rejected() {
        let mut encoded = sample_frame().encode().to_vec();
        encoded[0] = 0xA9;
        assert!(matches!(
            Frame::decode(&encoded),
            Err(FrameError::BadMarker(0xA9))
        ));
    }

    #[test]
    fn test_checksum_bitflip_rejected() {
        let encoded = sample_frame().encode().to_vec();
        let last = encoded.len() - 1;

        // Flipping any single bit of the checksum byte must fail decode
        for bit in 0..8 {
            let mut corrupted = encoded.clone();
            corrupted[last] ^= 1 << bit;
            assert!(
                matches!(
                    Frame::decode(&corrupted),
                    Err(FrameError::ChecksumMismatch { .. })
                ),
                "bit {} flip was not caught",
                bit
            );
        }
    }

    #[test]
    fn test_truncated_rejected() {
        let encoded = sample_frame().encode();
        let result = Frame::decode(&encoded[..encoded.len() - 2]);
        assert!(matches!(result, Err(FrameError::Truncated { .. })));

        assert!(matches!(
            Frame::decode(&[0xA8, 0x00]),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut encoded = sample_frame().encode().to_vec();
        // Declare a shorter frame than we actually have
        encoded[2] -= 1;
        assert!(matches!(
            Frame::decode(&encoded),
            Err(FrameError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_command_rejected() {
        // Hand-build a frame with an unrecognized command byte
        let mut buf = vec![FRAME_MARKER, 0x00, 0x06, 0x77, 0x01];
        let sum = buf.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        buf.push(sum);
        assert!(matches!(
            Frame::decode(&buf),
            Err(FrameError::UnknownCommand(0x77))
        ));

        assert!(matches!(
            Frame::new(0x77, Vec::new()),
            Err(FrameError::UnknownCommand(0x77))
        ));
    }

    #[test]
    fn test_peek_command() {
        let encoded = sample_frame().encode();
        assert_eq!(peek_command(&encoded), Some(cmd::POPUP_BY_SN));
        assert_eq!(peek_command(&encoded[..3]), None);
        assert_eq!(peek_command(&[0x00, 0x00, 0x06, 0x10]), None);
    }

    #[test]
    fn test_return_frame_example() {
        // RETURN event as observed from firmware: A8 00 0F 40 ... 15 bytes
        let frame = Frame::new(
            cmd::RETURN,
            vec![0x00, 0x05, 0xD2, 0x04, 0x00, 0x00, 0x01, 0x00, 0x00, 0x55],
        )
        .expect("valid frame");
        let encoded = frame.encode();
        assert_eq!(encoded.len(), 15);
        assert_eq!(&encoded[..4], &[0xA8, 0x00, 0x0F, 0x40]);
    }
}
