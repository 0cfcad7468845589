use std::fmt;
use thiserror::Error;

/// Errors surfaced to applications through the reader interface.
///
/// Each variant maps to one stable [`ErrorCode`] via [`Error::code`], which is
/// what an embedding application should branch on.
#[derive(Error, Debug)]
pub enum Error {
    // Discovery errors
    #[error("Reader service unavailable: {0}")]
    Discovery(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    // Permission errors
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device lost: {0}")]
    DeviceLost(String),

    #[error("Another connect is waiting for permission")]
    ConnectPending,

    // Connection errors
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("No card present: {0}")]
    NoCard(String),

    #[error("Power-on failed: {0}")]
    PowerOn(String),

    // Transmission errors
    #[error("Not connected to a card")]
    NotConnected,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transmit failed: {0}")]
    Transmit(String),

    #[error("Reader reported command failure: status=0x{status:02X}, error=0x{error:02X}")]
    ProtocolStatus { status: u8, error: u8 },

    #[error("Transport lost: {0}")]
    TransportLost(String),

    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a new power-on error.
    pub fn power_on(message: impl Into<String>) -> Self {
        Self::PowerOn(message.into())
    }

    /// Create a new transmit error.
    pub fn transmit(message: impl Into<String>) -> Self {
        Self::Transmit(message.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Stable code reported to the calling application.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Discovery(_) => ErrorCode::Unavailable,
            Self::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::DeviceLost(_) => ErrorCode::DeviceLost,
            Self::ConnectPending => ErrorCode::ConnectPending,
            Self::Connection(_) | Self::PowerOn(_) | Self::Io(_) => ErrorCode::ConnectionFailed,
            Self::NoCard(_) => ErrorCode::NoCard,
            Self::NotConnected => ErrorCode::NotConnected,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Transmit(_)
            | Self::ProtocolStatus { .. }
            | Self::TransportLost(_)
            | Self::Timeout { .. } => ErrorCode::TransmitFailed,
            Self::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// Whether the underlying transport can no longer be used.
    ///
    /// Callers should reconnect before issuing further commands.
    pub fn is_transport_lost(&self) -> bool {
        matches!(self, Self::TransportLost(_) | Self::DeviceLost(_))
    }
}

/// Error codes exposed across the application boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unavailable,
    DeviceNotFound,
    PermissionDenied,
    DeviceLost,
    ConnectPending,
    ConnectionFailed,
    NoCard,
    NotConnected,
    InvalidArgument,
    TransmitFailed,
    ConfigError,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "UNAVAILABLE",
            Self::DeviceNotFound => "DEVICE_NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::DeviceLost => "DEVICE_LOST",
            Self::ConnectPending => "CONNECT_PENDING",
            Self::ConnectionFailed => "CONNECTION_FAILED",
            Self::NoCard => "NO_CARD",
            Self::NotConnected => "NOT_CONNECTED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::TransmitFailed => "TRANSMIT_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
