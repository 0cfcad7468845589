//! Error types for reader transports and CCID sessions.
//!
//! Two layers are distinguished:
//!
//! - [`HardwareError`]: what a bulk transfer or device-level call reported,
//!   without interpretation.
//! - [`SessionError`]: what went wrong in the CCID exchange built on top of
//!   those transfers.
//!
//! Neither type is surfaced to applications directly. The reader converts
//! them into [`cardlink_core::Error`] with the phase (connect or transmit)
//! deciding which public code applies.

use cardlink_core::Error;
use cardlink_protocol::{DecodeError, SlotError};

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors reported by the transport and device layer.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device is not connected or has been unplugged.
    #[error("Device disconnected: {device}")]
    Disconnected { device: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Host denied access to the device.
    #[error("Access denied: {device}")]
    AccessDenied { device: String },

    /// Device, interface or endpoint does not exist.
    #[error("Not found: {device}")]
    NotFound { device: String },

    /// Interface is claimed by another driver or process.
    #[error("Device busy: {device}")]
    Busy { device: String },

    /// Device communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    /// Create a new disconnected error.
    pub fn disconnected(device: impl Into<String>) -> Self {
        Self::Disconnected {
            device: device.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new access denied error.
    pub fn access_denied(device: impl Into<String>) -> Self {
        Self::AccessDenied {
            device: device.into(),
        }
    }

    /// Create a new not found error.
    pub fn not_found(device: impl Into<String>) -> Self {
        Self::NotFound {
            device: device.into(),
        }
    }

    /// Create a new communication error.
    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    /// Create a generic error with custom message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Map a failure while opening and claiming a device.
    pub fn into_open_error(self, reader: &str) -> Error {
        match self {
            Self::Disconnected { .. } | Self::NotFound { .. } => {
                Error::DeviceLost(format!("{reader}: {self}"))
            }
            Self::AccessDenied { .. } => Error::PermissionDenied(format!("{reader}: {self}")),
            other => Error::connection(format!("{reader}: {other}")),
        }
    }
}

/// Errors raised by a CCID session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport has already been released.
    #[error("Session closed")]
    Closed,

    /// APDU exchange attempted before a successful power-on.
    #[error("Card is not powered")]
    NotPowered,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Short write: {written} of {expected} bytes")]
    WriteFailed { written: usize, expected: usize },

    #[error("Short read: {len} bytes, need at least a CCID header")]
    ReadFailed { len: usize },

    #[error("Malformed response: {0}")]
    Decode(#[from] DecodeError),

    /// Reader reported a failed command.
    #[error("CCID command failed: status=0x{status:02X}, error={}", slot_error(.error))]
    CcidError { status: u8, error: u8 },

    #[error("Unexpected message type 0x{actual:02X}, expected 0x{expected:02X}")]
    UnexpectedMessageType { expected: u8, actual: u8 },

    /// Header declared more payload than one read delivered.
    #[error("Truncated response: declared {declared} bytes, received {available}")]
    TruncatedResponse { declared: u32, available: usize },

    /// Response does not answer the command just sent.
    #[error("Sequence mismatch: sent {expected}, received {actual}")]
    SequenceMismatch { expected: u8, actual: u8 },

    #[error("No card in slot (status=0x{status:02X})")]
    NoCard { status: u8 },

    #[error("Reader requested more than {limit} time extensions")]
    TimeExtensionLimit { limit: u32 },

    /// Transport is unusable; the reader must be reconnected.
    #[error("Transport lost: {0}")]
    TransportLost(String),

    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

fn slot_error(code: &u8) -> SlotError {
    SlotError::from_code(*code)
}

impl SessionError {
    /// Create a new invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Whether the session can no longer reach the reader.
    pub fn is_transport_lost(&self) -> bool {
        matches!(self, Self::TransportLost(_) | Self::Closed)
    }

    /// Map a failure during power-on, which is part of `connect`.
    pub fn into_connect_error(self, reader: &str) -> Error {
        match self {
            Self::NoCard { .. } => Error::NoCard(format!("{reader}: {self}")),
            Self::TransportLost(_) => Error::DeviceLost(format!("{reader}: {self}")),
            Self::InvalidArgument(message) => Error::InvalidArgument(message),
            other => Error::power_on(format!("{reader}: {other}")),
        }
    }

    /// Map a failure during `transmit`.
    pub fn into_transmit_error(self) -> Error {
        match self {
            Self::Closed | Self::NotPowered => Error::NotConnected,
            Self::InvalidArgument(message) => Error::InvalidArgument(message),
            Self::CcidError { status, error } => Error::ProtocolStatus { status, error },
            Self::Hardware(HardwareError::Timeout { duration_ms }) => {
                Error::Timeout { duration_ms }
            }
            Self::TransportLost(message) => Error::TransportLost(message),
            other => Error::transmit(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_core::ErrorCode;
    use rstest::rstest;

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(3000);
        assert!(matches!(error, HardwareError::Timeout { .. }));
        assert_eq!(error.to_string(), "Operation timeout after 3000ms");
    }

    #[test]
    fn test_disconnected_error() {
        let error = HardwareError::disconnected("/dev/bus/usb/001/004");
        assert_eq!(
            error.to_string(),
            "Device disconnected: /dev/bus/usb/001/004"
        );
    }

    #[rstest]
    #[case(HardwareError::disconnected("r"), ErrorCode::DeviceLost)]
    #[case(HardwareError::not_found("r"), ErrorCode::DeviceLost)]
    #[case(HardwareError::access_denied("r"), ErrorCode::PermissionDenied)]
    #[case(HardwareError::Busy { device: "r".into() }, ErrorCode::ConnectionFailed)]
    #[case(HardwareError::communication("no bulk endpoints"), ErrorCode::ConnectionFailed)]
    fn test_open_error_codes(#[case] error: HardwareError, #[case] expected: ErrorCode) {
        assert_eq!(error.into_open_error("r").code(), expected);
    }

    #[rstest]
    #[case(SessionError::NoCard { status: 0x42 }, ErrorCode::NoCard)]
    #[case(SessionError::ReadFailed { len: 3 }, ErrorCode::ConnectionFailed)]
    #[case(SessionError::UnexpectedMessageType { expected: 0x80, actual: 0x81 }, ErrorCode::ConnectionFailed)]
    #[case(SessionError::CcidError { status: 0x40, error: 0xFE }, ErrorCode::ConnectionFailed)]
    #[case(SessionError::TransportLost("unplugged".into()), ErrorCode::DeviceLost)]
    fn test_connect_error_codes(#[case] error: SessionError, #[case] expected: ErrorCode) {
        assert_eq!(error.into_connect_error("reader").code(), expected);
    }

    #[rstest]
    #[case(SessionError::NotPowered, ErrorCode::NotConnected)]
    #[case(SessionError::Closed, ErrorCode::NotConnected)]
    #[case(SessionError::invalid_argument("empty APDU"), ErrorCode::InvalidArgument)]
    #[case(SessionError::CcidError { status: 0x40, error: 0x01 }, ErrorCode::TransmitFailed)]
    #[case(SessionError::Hardware(HardwareError::timeout(5000)), ErrorCode::TransmitFailed)]
    #[case(SessionError::TruncatedResponse { declared: 256, available: 40 }, ErrorCode::TransmitFailed)]
    #[case(SessionError::TransportLost("gone".into()), ErrorCode::TransmitFailed)]
    fn test_transmit_error_codes(#[case] error: SessionError, #[case] expected: ErrorCode) {
        assert_eq!(error.into_transmit_error().code(), expected);
    }

    #[test]
    fn test_ccid_error_keeps_raw_bytes() {
        let error = SessionError::CcidError {
            status: 0x40,
            error: 0x01,
        }
        .into_transmit_error();
        assert!(matches!(
            error,
            Error::ProtocolStatus {
                status: 0x40,
                error: 0x01
            }
        ));
    }

    #[test]
    fn test_ccid_error_display_names_slot_error() {
        let error = SessionError::CcidError {
            status: 0x41,
            error: 0xFE,
        };
        assert_eq!(
            error.to_string(),
            "CCID command failed: status=0x41, error=card did not respond (0xFE)"
        );
    }

    #[test]
    fn test_transport_lost_maps_to_transport_lost() {
        let error = SessionError::TransportLost("unplugged".into()).into_transmit_error();
        assert!(error.is_transport_lost());
    }
}
