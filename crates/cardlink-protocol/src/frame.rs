//! CCID bulk frame encoding and decoding.
//!
//! Both directions share the 10-byte header layout described in
//! [`cardlink_core::constants`]. Commands carry three message-specific
//! parameter bytes; responses carry `bStatus`, `bError` and
//! `bChainParameter` in the same position.
//!
//! # Basic Usage
//!
//! ```
//! use cardlink_protocol::{CommandFrame, ResponseType, decode_response};
//!
//! let apdu = [0x00, 0xA4, 0x04, 0x00];
//! let command = CommandFrame::xfr_block(0, 7, 4, 0, &apdu);
//! let bytes = command.encode();
//! assert_eq!(bytes.len(), 14);
//! assert_eq!(&bytes[..10], &[0x6F, 4, 0, 0, 0, 0, 7, 4, 0, 0]);
//!
//! let reply = [0x80, 2, 0, 0, 0, 0, 7, 0, 0, 0, 0x90, 0x00];
//! let response = decode_response(&reply).unwrap();
//! assert_eq!(response.response_type(), Some(ResponseType::DataBlock));
//! assert_eq!(response.sequence, 7);
//! assert_eq!(&response.payload[..], &[0x90, 0x00]);
//! ```
//!
//! # Truncated Responses
//!
//! A response may declare more payload than the buffer holds. Decoding does
//! not fail in that case: the payload is clamped to the bytes present and
//! [`ResponseFrame::is_complete`] reports `false`. Callers decide whether a
//! short payload is acceptable.

use crate::message::{CommandType, ResponseType, VoltageSelect};
use crate::status::{CommandStatus, IccStatus, classify_status};
use bytes::{BufMut, Bytes, BytesMut};
use cardlink_core::constants::{CCID_HEADER_LEN, CCID_PARAMETER_LEN};
use std::fmt;
use thiserror::Error;

/// Errors produced while decoding a response frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame too short: {len} bytes, header needs {CCID_HEADER_LEN}")]
    FrameTooShort { len: usize },
}

/// Encode a raw command frame.
///
/// The length field is the payload length. Payloads larger than `u32::MAX`
/// are not representable and must be split by the caller.
pub fn encode_command(
    message_type: CommandType,
    slot: u8,
    sequence: u8,
    parameters: [u8; CCID_PARAMETER_LEN],
    payload: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(CCID_HEADER_LEN + payload.len());
    buf.put_u8(message_type.as_u8());
    buf.put_u32_le(payload.len() as u32);
    buf.put_u8(slot);
    buf.put_u8(sequence);
    buf.put_slice(&parameters);
    buf.put_slice(payload);
    buf.freeze()
}

/// Decode a response frame from the bytes returned by one bulk read.
///
/// # Errors
///
/// Returns [`DecodeError::FrameTooShort`] if fewer than 10 bytes are given.
/// A declared length larger than the remaining bytes is not an error; see
/// [`ResponseFrame::is_complete`].
pub fn decode_response(bytes: &[u8]) -> Result<ResponseFrame, DecodeError> {
    ResponseFrame::decode(bytes)
}

/// Host-to-reader message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub message_type: CommandType,
    pub slot: u8,
    pub sequence: u8,
    pub parameters: [u8; CCID_PARAMETER_LEN],
    pub payload: Bytes,
}

impl CommandFrame {
    pub fn new(
        message_type: CommandType,
        slot: u8,
        sequence: u8,
        parameters: [u8; CCID_PARAMETER_LEN],
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            message_type,
            slot,
            sequence,
            parameters,
            payload: payload.into(),
        }
    }

    /// `PC_to_RDR_IccPowerOn` with the given voltage selection.
    pub fn power_on(slot: u8, sequence: u8, voltage: VoltageSelect) -> Self {
        Self::new(
            CommandType::IccPowerOn,
            slot,
            sequence,
            [voltage.as_u8(), 0, 0],
            Bytes::new(),
        )
    }

    /// `PC_to_RDR_IccPowerOff`.
    pub fn power_off(slot: u8, sequence: u8) -> Self {
        Self::new(CommandType::IccPowerOff, slot, sequence, [0; 3], Bytes::new())
    }

    /// `PC_to_RDR_GetSlotStatus`.
    pub fn get_slot_status(slot: u8, sequence: u8) -> Self {
        Self::new(
            CommandType::GetSlotStatus,
            slot,
            sequence,
            [0; 3],
            Bytes::new(),
        )
    }

    /// `PC_to_RDR_XfrBlock` carrying one APDU.
    ///
    /// `level` is the `wLevelParameter` used for extended APDU chaining;
    /// zero means the APDU begins and ends in this frame.
    pub fn xfr_block(slot: u8, sequence: u8, bwi: u8, level: u16, apdu: &[u8]) -> Self {
        let [lo, hi] = level.to_le_bytes();
        Self::new(
            CommandType::XfrBlock,
            slot,
            sequence,
            [bwi, lo, hi],
            Bytes::copy_from_slice(apdu),
        )
    }

    /// Total encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        CCID_HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self) -> Bytes {
        encode_command(
            self.message_type,
            self.slot,
            self.sequence,
            self.parameters,
            &self.payload,
        )
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} slot={} seq={} len={}",
            self.message_type.name(),
            self.slot,
            self.sequence,
            self.payload.len()
        )
    }
}

/// Reader-to-host message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Raw `bMessageType`; unknown values are kept so callers can report them.
    pub message_type: u8,

    /// Payload length declared by the header.
    pub data_length: u32,

    pub slot: u8,
    pub sequence: u8,
    pub status: u8,
    pub error: u8,
    pub chain_parameter: u8,

    /// Payload bytes present in the buffer, at most `data_length`.
    pub payload: Bytes,
}

impl ResponseFrame {
    /// Decode a response frame. See [`decode_response`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < CCID_HEADER_LEN {
            return Err(DecodeError::FrameTooShort { len: bytes.len() });
        }

        let data_length = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let available = bytes.len() - CCID_HEADER_LEN;
        let take = usize::try_from(data_length)
            .map_or(available, |declared| declared.min(available));

        Ok(Self {
            message_type: bytes[0],
            data_length,
            slot: bytes[5],
            sequence: bytes[6],
            status: bytes[7],
            error: bytes[8],
            chain_parameter: bytes[9],
            payload: Bytes::copy_from_slice(&bytes[CCID_HEADER_LEN..CCID_HEADER_LEN + take]),
        })
    }

    /// Whether the buffer held every payload byte the header declared.
    pub fn is_complete(&self) -> bool {
        self.available_len() as u64 == u64::from(self.data_length)
    }

    /// Number of payload bytes actually decoded.
    pub fn available_len(&self) -> usize {
        self.payload.len()
    }

    /// Known response type, or `None` for unrecognised message types.
    pub fn response_type(&self) -> Option<ResponseType> {
        ResponseType::try_from(self.message_type).ok()
    }

    pub fn command_status(&self) -> CommandStatus {
        classify_status(self.status)
    }

    pub fn icc_status(&self) -> IccStatus {
        IccStatus::from_status(self.status)
    }

    /// Encode this response back to wire format.
    ///
    /// The declared length is written as stored, so a truncated frame
    /// re-encodes as truncated. Used by reader doubles in tests.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CCID_HEADER_LEN + self.payload.len());
        buf.put_u8(self.message_type);
        buf.put_u32_le(self.data_length);
        buf.put_u8(self.slot);
        buf.put_u8(self.sequence);
        buf.put_u8(self.status);
        buf.put_u8(self.error);
        buf.put_u8(self.chain_parameter);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

impl fmt::Display for ResponseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.response_type() {
            Some(ty) => write!(f, "{}", ty.name())?,
            None => write!(f, "unknown(0x{:02X})", self.message_type)?,
        }
        write!(
            f,
            " slot={} seq={} status=0x{:02X} error=0x{:02X} len={}/{}",
            self.slot,
            self.sequence,
            self.status,
            self.error,
            self.available_len(),
            self.data_length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_power_on_encoding() {
        let frame = CommandFrame::power_on(0, 0, VoltageSelect::Automatic);
        assert_eq!(
            frame.encode().as_ref(),
            &[0x62, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_xfr_block_encoding() {
        let apdu = [0x00, 0xA4, 0x04, 0x00];
        let frame = CommandFrame::xfr_block(0, 0x2A, 4, 0, &apdu);
        let bytes = frame.encode();

        assert_eq!(bytes.len(), frame.encoded_len());
        assert_eq!(
            bytes.as_ref(),
            &[0x6F, 4, 0, 0, 0, 0, 0x2A, 4, 0, 0, 0x00, 0xA4, 0x04, 0x00]
        );
    }

    #[test]
    fn test_xfr_block_level_is_little_endian() {
        let frame = CommandFrame::xfr_block(0, 0, 0, 0x0102, &[0x00]);
        assert_eq!(frame.parameters, [0, 0x02, 0x01]);
    }

    #[test]
    fn test_length_field_little_endian() {
        let payload = vec![0xAB; 0x0123];
        let bytes = encode_command(CommandType::XfrBlock, 0, 0, [0; 3], &payload);
        assert_eq!(&bytes[1..5], &[0x23, 0x01, 0x00, 0x00]);
        assert_eq!(bytes.len(), CCID_HEADER_LEN + 0x0123);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(5)]
    #[case(9)]
    fn test_short_frames_rejected(#[case] len: usize) {
        let bytes = vec![0x80; len];
        assert_eq!(
            decode_response(&bytes),
            Err(DecodeError::FrameTooShort { len })
        );
    }

    #[test]
    fn test_decode_header_fields() {
        let bytes = [0x81, 0, 0, 0, 0, 0, 0x09, 0x42, 0xFE, 0x01];
        let frame = decode_response(&bytes).unwrap();

        assert_eq!(frame.response_type(), Some(ResponseType::SlotStatus));
        assert_eq!(frame.data_length, 0);
        assert_eq!(frame.sequence, 0x09);
        assert_eq!(frame.status, 0x42);
        assert_eq!(frame.error, 0xFE);
        assert_eq!(frame.chain_parameter, 0x01);
        assert_eq!(frame.command_status(), CommandStatus::Failure);
        assert_eq!(frame.icc_status(), IccStatus::NotPresent);
        assert!(frame.payload.is_empty());
        assert!(frame.is_complete());
    }

    #[test]
    fn test_decode_clamps_truncated_payload() {
        let mut bytes = vec![0x80, 0x00, 0x01, 0x00, 0x00, 0, 0, 0, 0, 0];
        bytes.extend(std::iter::repeat_n(0x55, 40));
        let frame = decode_response(&bytes).unwrap();

        assert_eq!(frame.data_length, 256);
        assert_eq!(frame.available_len(), 40);
        assert!(!frame.is_complete());
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let bytes = [0x80, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0x90, 0x00, 0xEE, 0xEE];
        let frame = decode_response(&bytes).unwrap();
        assert_eq!(&frame.payload[..], &[0x90, 0x00]);
        assert!(frame.is_complete());
    }

    #[test]
    fn test_decode_unknown_message_type() {
        let bytes = [0x6F, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let frame = decode_response(&bytes).unwrap();
        assert_eq!(frame.response_type(), None);
        assert!(frame.to_string().starts_with("unknown(0x6F)"));
    }

    #[test]
    fn test_response_encode_round_trip() {
        let bytes = [0x80, 3, 0, 0, 0, 0, 5, 0, 0, 0, 0x3B, 0x8F, 0x80];
        let frame = decode_response(&bytes).unwrap();
        assert_eq!(frame.encode().as_ref(), &bytes);
    }
}
