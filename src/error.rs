//! Error taxonomy surfaced to gateway callers

use rentbox_protocol::frame::FrameError;
use rentbox_protocol::messages::ParseError;
use thiserror::Error;

/// Errors a backend caller can observe from the gateway core
///
/// Decode failures on inbound traffic never reach a caller who didn't ask
/// for the decode; the transport supervisor drops and logs them locally.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The device is not currently ONLINE; no network call was attempted
    #[error("Device is Offline: {0}")]
    Offline(String),

    /// The command was published but no reply arrived within the deadline
    #[error("Request Time Out")]
    Timeout,

    /// CHECK succeeded but no slot met the caller's criteria
    #[error("No powerbank meets the requested charge level")]
    NoEligibleSlot,

    /// Publish attempted while the transport is not connected
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame the caller asked for could not be built or decoded
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A reply frame arrived but its payload did not parse
    #[error(transparent)]
    Parse(#[from] ParseError),
}
