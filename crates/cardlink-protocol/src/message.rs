//! CCID bulk message type definitions.
//!
//! Byte 0 of every CCID bulk message identifies its type. Host-to-reader
//! commands live in the `0x61..=0x73` range; reader-to-host responses in
//! `0x80..=0x84`.
//!
//! # Command Categories
//!
//! ## Card Power
//! - `IccPowerOn` (0x62): apply power, answered with a DataBlock carrying the ATR
//! - `IccPowerOff` (0x63): remove power, answered with SlotStatus
//! - `GetSlotStatus` (0x65): query presence/activation, answered with SlotStatus
//!
//! ## Data Exchange
//! - `XfrBlock` (0x6F): carry one APDU, answered with a DataBlock
//!
//! The remaining commands (parameters, escape, clock, secure PIN entry,
//! mechanical, abort, data rate) are defined for completeness of the codec.
//!
//! # Usage
//!
//! ```
//! use cardlink_protocol::{CommandType, ResponseType};
//!
//! assert_eq!(CommandType::XfrBlock.as_u8(), 0x6F);
//! assert_eq!(ResponseType::try_from(0x80).unwrap(), ResponseType::DataBlock);
//! assert!(ResponseType::try_from(0x6F).is_err());
//! ```

use std::fmt;

/// Host-to-reader (`PC_to_RDR_*`) message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    SetParameters = 0x61,
    IccPowerOn = 0x62,
    IccPowerOff = 0x63,
    GetSlotStatus = 0x65,
    Secure = 0x69,
    T0Apdu = 0x6A,
    Escape = 0x6B,
    GetParameters = 0x6C,
    ResetParameters = 0x6D,
    IccClock = 0x6E,
    XfrBlock = 0x6F,
    Mechanical = 0x71,
    Abort = 0x72,
    SetDataRateAndClockFrequency = 0x73,
}

impl CommandType {
    /// Every command type, in wire order.
    pub const ALL: [CommandType; 14] = [
        Self::SetParameters,
        Self::IccPowerOn,
        Self::IccPowerOff,
        Self::GetSlotStatus,
        Self::Secure,
        Self::T0Apdu,
        Self::Escape,
        Self::GetParameters,
        Self::ResetParameters,
        Self::IccClock,
        Self::XfrBlock,
        Self::Mechanical,
        Self::Abort,
        Self::SetDataRateAndClockFrequency,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Message name as written in USB CCID 1.1.
    pub fn name(self) -> &'static str {
        match self {
            Self::SetParameters => "PC_to_RDR_SetParameters",
            Self::IccPowerOn => "PC_to_RDR_IccPowerOn",
            Self::IccPowerOff => "PC_to_RDR_IccPowerOff",
            Self::GetSlotStatus => "PC_to_RDR_GetSlotStatus",
            Self::Secure => "PC_to_RDR_Secure",
            Self::T0Apdu => "PC_to_RDR_T0APDU",
            Self::Escape => "PC_to_RDR_Escape",
            Self::GetParameters => "PC_to_RDR_GetParameters",
            Self::ResetParameters => "PC_to_RDR_ResetParameters",
            Self::IccClock => "PC_to_RDR_IccClock",
            Self::XfrBlock => "PC_to_RDR_XfrBlock",
            Self::Mechanical => "PC_to_RDR_Mechanical",
            Self::Abort => "PC_to_RDR_Abort",
            Self::SetDataRateAndClockFrequency => "PC_to_RDR_SetDataRateAndClockFrequency",
        }
    }

    /// Response type the reader answers this command with.
    pub fn expected_response(self) -> ResponseType {
        match self {
            Self::IccPowerOn | Self::XfrBlock | Self::Secure => ResponseType::DataBlock,
            Self::SetParameters | Self::GetParameters | Self::ResetParameters => {
                ResponseType::Parameters
            }
            Self::Escape => ResponseType::Escape,
            Self::SetDataRateAndClockFrequency => ResponseType::DataRateAndClockFrequency,
            Self::IccPowerOff
            | Self::GetSlotStatus
            | Self::T0Apdu
            | Self::IccClock
            | Self::Mechanical
            | Self::Abort => ResponseType::SlotStatus,
        }
    }
}

impl TryFrom<u8> for CommandType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_u8() == value)
            .ok_or(value)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_u8())
    }
}

/// Reader-to-host (`RDR_to_PC_*`) message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseType {
    DataBlock = 0x80,
    SlotStatus = 0x81,
    Parameters = 0x82,
    Escape = 0x83,
    DataRateAndClockFrequency = 0x84,
}

impl ResponseType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DataBlock => "RDR_to_PC_DataBlock",
            Self::SlotStatus => "RDR_to_PC_SlotStatus",
            Self::Parameters => "RDR_to_PC_Parameters",
            Self::Escape => "RDR_to_PC_Escape",
            Self::DataRateAndClockFrequency => "RDR_to_PC_DataRateAndClockFrequency",
        }
    }
}

impl TryFrom<u8> for ResponseType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x80 => Ok(Self::DataBlock),
            0x81 => Ok(Self::SlotStatus),
            0x82 => Ok(Self::Parameters),
            0x83 => Ok(Self::Escape),
            0x84 => Ok(Self::DataRateAndClockFrequency),
            other => Err(other),
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_u8())
    }
}

/// `bPowerSelect` values for IccPowerOn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum VoltageSelect {
    /// Reader picks the voltage.
    #[default]
    Automatic = 0x00,
    V5 = 0x01,
    V3 = 0x02,
    V1_8 = 0x03,
}

impl VoltageSelect {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
