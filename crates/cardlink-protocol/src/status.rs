//! Interpretation of the `bStatus` and `bError` bytes of CCID responses.
//!
//! ```text
//! bStatus bit 7..6  bmCommandStatus   0 = processed, 1 = failed, 2 = time extension
//! bStatus bit 1..0  bmICCStatus       0 = present and active, 1 = present and inactive,
//!                                     2 = not present
//! ```
//!
//! `bError` only carries meaning when the command status reports a failure.

use std::fmt;

const COMMAND_STATUS_SHIFT: u8 = 6;
const TWO_BIT_MASK: u8 = 0b11;

/// Outcome of a command as reported by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    /// Command processed without error.
    Success,

    /// Command failed; `bError` holds the reason.
    Failure,

    /// Reader needs more time; another response will follow.
    TimeExtension,
}

impl CommandStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::TimeExtension => "time-extension",
        };
        write!(f, "{s}")
    }
}

/// Classify the command status bits (7..6) of a `bStatus` byte.
///
/// Only the value `1` is a failure. The reserved value `3` is treated as
/// success, as is any status whose upper bits are clear.
///
/// ```
/// use cardlink_protocol::{CommandStatus, classify_status};
///
/// assert_eq!(classify_status(0x00), CommandStatus::Success);
/// assert_eq!(classify_status(0x40), CommandStatus::Failure);
/// assert_eq!(classify_status(0x80), CommandStatus::TimeExtension);
/// assert_eq!(classify_status(0xC0), CommandStatus::Success);
/// ```
pub fn classify_status(status: u8) -> CommandStatus {
    match (status >> COMMAND_STATUS_SHIFT) & TWO_BIT_MASK {
        1 => CommandStatus::Failure,
        2 => CommandStatus::TimeExtension,
        _ => CommandStatus::Success,
    }
}

/// Card presence as reported in bits 1..0 of `bStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IccStatus {
    PresentActive,
    PresentInactive,
    NotPresent,

    /// Value 3 is reserved.
    Reserved,
}

impl IccStatus {
    pub fn from_status(status: u8) -> Self {
        match status & TWO_BIT_MASK {
            0 => Self::PresentActive,
            1 => Self::PresentInactive,
            2 => Self::NotPresent,
            _ => Self::Reserved,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::PresentActive | Self::PresentInactive)
    }
}

impl fmt::Display for IccStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::PresentActive => "present-active",
            Self::PresentInactive => "present-inactive",
            Self::NotPresent => "not-present",
            Self::Reserved => "reserved",
        };
        write!(f, "{s}")
    }
}

/// Slot error codes carried in `bError` of a failed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotError {
    CommandAborted,
    IccMute,
    XfrParityError,
    XfrOverrun,
    HardwareError,
    BadAtrTs,
    BadAtrTck,
    IccProtocolNotSupported,
    IccClassNotSupported,
    ProcedureByteConflict,
    DeactivatedProtocol,
    BusyWithAutoSequence,
    PinTimeout,
    PinCancelled,
    CommandSlotBusy,
    CommandNotSupported,

    /// Offset of the offending header or payload field (0x01..=0x7F),
    /// or a vendor code.
    Other(u8),
}

impl SlotError {
    pub fn from_code(code: u8) -> Self {
        match code {
            0xFF => Self::CommandAborted,
            0xFE => Self::IccMute,
            0xFD => Self::XfrParityError,
            0xFC => Self::XfrOverrun,
            0xFB => Self::HardwareError,
            0xF8 => Self::BadAtrTs,
            0xF7 => Self::BadAtrTck,
            0xF6 => Self::IccProtocolNotSupported,
            0xF5 => Self::IccClassNotSupported,
            0xF4 => Self::ProcedureByteConflict,
            0xF3 => Self::DeactivatedProtocol,
            0xF2 => Self::BusyWithAutoSequence,
            0xF0 => Self::PinTimeout,
            0xEF => Self::PinCancelled,
            0xE0 => Self::CommandSlotBusy,
            0x00 => Self::CommandNotSupported,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::CommandAborted => 0xFF,
            Self::IccMute => 0xFE,
            Self::XfrParityError => 0xFD,
            Self::XfrOverrun => 0xFC,
            Self::HardwareError => 0xFB,
            Self::BadAtrTs => 0xF8,
            Self::BadAtrTck => 0xF7,
            Self::IccProtocolNotSupported => 0xF6,
            Self::IccClassNotSupported => 0xF5,
            Self::ProcedureByteConflict => 0xF4,
            Self::DeactivatedProtocol => 0xF3,
            Self::BusyWithAutoSequence => 0xF2,
            Self::PinTimeout => 0xF0,
            Self::PinCancelled => 0xEF,
            Self::CommandSlotBusy => 0xE0,
            Self::CommandNotSupported => 0x00,
            Self::Other(code) => *code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::CommandAborted => "command aborted",
            Self::IccMute => "card did not respond",
            Self::XfrParityError => "parity error during transfer",
            Self::XfrOverrun => "overrun during transfer",
            Self::HardwareError => "reader hardware error",
            Self::BadAtrTs => "invalid ATR TS byte",
            Self::BadAtrTck => "invalid ATR TCK byte",
            Self::IccProtocolNotSupported => "card protocol not supported",
            Self::IccClassNotSupported => "card voltage class not supported",
            Self::ProcedureByteConflict => "procedure byte conflict",
            Self::DeactivatedProtocol => "protocol deactivated",
            Self::BusyWithAutoSequence => "slot busy with automatic sequence",
            Self::PinTimeout => "PIN entry timed out",
            Self::PinCancelled => "PIN entry cancelled",
            Self::CommandSlotBusy => "slot busy with another command",
            Self::CommandNotSupported => "command not supported",
            Self::Other(_) => "field error",
        }
    }
}

impl From<u8> for SlotError {
    fn from(code: u8) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x00, CommandStatus::Success)]
    #[case(0x01, CommandStatus::Success)]
    #[case(0x02, CommandStatus::Success)]
    #[case(0x3F, CommandStatus::Success)]
    #[case(0x40, CommandStatus::Failure)]
    #[case(0x41, CommandStatus::Failure)]
    #[case(0x42, CommandStatus::Failure)]
    #[case(0x80, CommandStatus::TimeExtension)]
    #[case(0xC0, CommandStatus::Success)]
    #[case(0xFF, CommandStatus::Success)]
    fn test_classify_status(#[case] status: u8, #[case] expected: CommandStatus) {
        assert_eq!(classify_status(status), expected);
    }

    #[test]
    fn test_classify_status_ignores_low_bits() {
        for status in 0u8..=255 {
            assert_eq!(classify_status(status), classify_status(status & 0xC0));
        }
    }

    #[rstest]
    #[case(0x00, IccStatus::PresentActive, true)]
    #[case(0x01, IccStatus::PresentInactive, true)]
    #[case(0x02, IccStatus::NotPresent, false)]
    #[case(0x42, IccStatus::NotPresent, false)]
    #[case(0x03, IccStatus::Reserved, false)]
    fn test_icc_status(#[case] status: u8, #[case] expected: IccStatus, #[case] present: bool) {
        let icc = IccStatus::from_status(status);
        assert_eq!(icc, expected);
        assert_eq!(icc.is_present(), present);
    }

    #[rstest]
    #[case(0xFE, SlotError::IccMute)]
    #[case(0xFB, SlotError::HardwareError)]
    #[case(0xE0, SlotError::CommandSlotBusy)]
    #[case(0x00, SlotError::CommandNotSupported)]
    #[case(0x05, SlotError::Other(0x05))]
    fn test_slot_error_codes(#[case] code: u8, #[case] expected: SlotError) {
        let error = SlotError::from(code);
        assert_eq!(error, expected);
        assert_eq!(error.code(), code);
    }

    #[test]
    fn test_slot_error_display() {
        assert_eq!(
            SlotError::IccMute.to_string(),
            "card did not respond (0xFE)"
        );
    }
}
