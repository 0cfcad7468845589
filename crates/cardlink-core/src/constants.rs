//! Core constants for the CCID smart-card stack.
//!
//! This module collects the protocol-level numbers used across the workspace:
//! the CCID frame layout, the USB interface class that identifies a
//! smart-card reader, and the default timing and buffer sizes used by the
//! session driver.
//!
//! # Frame Layout
//!
//! Every CCID bulk message starts with a fixed 10-byte header:
//!
//! ```text
//! Offset  Size  Field
//! 0       1     bMessageType
//! 1       4     dwLength (little-endian, payload only)
//! 5       1     bSlot
//! 6       1     bSeq
//! 7       3     message-specific parameters / bStatus, bError, bChainParameter
//! 10      N     payload
//! ```
//!
//! # Usage
//!
//! ```
//! use cardlink_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(CCID_HEADER_LEN, 10);
//! let timeout = Duration::from_millis(DEFAULT_IO_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 5);
//! ```

// ============================================================================
// Frame Layout
// ============================================================================

/// Size of the fixed CCID message header in bytes.
pub const CCID_HEADER_LEN: usize = 10;

/// Number of message-specific parameter bytes in a command header.
pub const CCID_PARAMETER_LEN: usize = 3;

/// Slot index used by the single-slot model.
pub const DEFAULT_SLOT: u8 = 0;

// ============================================================================
// Device Identification
// ============================================================================

/// USB interface class code for smart-card readers (CCID).
///
/// A device is treated as a reader when any of its interfaces reports this
/// class.
pub const CCID_INTERFACE_CLASS: u8 = 0x0B;

// ============================================================================
// Session Defaults
// ============================================================================

/// Timeout applied to every bulk write and read, in milliseconds.
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 5_000;

/// Wait after a successful power-on before the card accepts APDUs.
///
/// Card electrical initialisation completes asynchronously to the reader's
/// acknowledgement; common readers drop the first XfrBlock without it.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 150;

/// Read size for the power-on acknowledgement (header plus ATR).
pub const DEFAULT_POWER_ON_RESPONSE_LEN: usize = 64;

/// Read size for an XfrBlock response.
pub const DEFAULT_MAX_RESPONSE_LEN: usize = 1024;

/// Block waiting time integer placed in XfrBlock parameter byte 0.
pub const DEFAULT_BLOCK_WAITING_INTEGER: u8 = 4;

/// Maximum consecutive time-extension responses accepted for one command.
pub const DEFAULT_MAX_TIME_EXTENSIONS: u32 = 16;
