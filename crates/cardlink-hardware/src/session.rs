//! CCID session driver.
//!
//! A [`CcidSession`] owns one [`BulkTransport`] for its whole life together
//! with the slot index, the sequence counter and the card power state.
//!
//! # Lifecycle
//!
//! ```text
//! Unpowered --power_on ok--> Powered --transceive--> Powered
//!     ^            |                         |
//!     +--- failure +          close / lost --+--> Unpowered (transport released)
//! ```
//!
//! Every command frame consumes one sequence number, wrapping at 256. With
//! `verify_sequence` enabled a response carrying any other sequence number
//! is treated as desynchronisation: the command fails and the card drops to
//! `Unpowered` so the caller powers it on again before continuing. The one
//! exception is a late answer to a command whose read timed out: it is
//! discarded and the read repeated, so a timeout can be retried.
//!
//! A session is not reentrant. Callers serialise `transceive` calls, which
//! `&mut self` enforces within one task.

use crate::error::{HardwareError, SessionError};
use crate::traits::BulkTransport;
use bytes::Bytes;
use cardlink_core::constants::DEFAULT_SLOT;
use cardlink_core::{PowerState, SessionConfig};
use cardlink_protocol::{
    CommandFrame, CommandStatus, CommandType, IccStatus, ResponseFrame, VoltageSelect,
    decode_response,
};
use tracing::{debug, info, trace, warn};

type SessionResult<T> = std::result::Result<T, SessionError>;

/// Stateful CCID driver over one transport.
///
/// # Examples
///
/// ```
/// use cardlink_core::SessionConfig;
/// use cardlink_hardware::mock::{MockResponse, MockTransport};
/// use cardlink_hardware::session::CcidSession;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (transport, handle) = MockTransport::new();
/// handle.push_response(MockResponse::data_block([0x3B, 0x00]));
/// handle.push_response(MockResponse::data_block([0x90, 0x00]));
///
/// let config = SessionConfig { settle_delay_ms: 0, ..SessionConfig::default() };
/// let mut session = CcidSession::new(transport, config);
/// session.power_on().await.unwrap();
///
/// let response = session.transceive(&[0x00, 0xA4, 0x04, 0x00]).await.unwrap();
/// assert_eq!(&response[..], &[0x90, 0x00]);
/// session.close().await;
/// # }
/// ```
#[derive(Debug)]
pub struct CcidSession<T: BulkTransport> {
    transport: Option<T>,
    config: SessionConfig,
    slot: u8,
    sequence: u8,
    state: PowerState,
    atr: Option<Bytes>,
    /// Sequence of the last command whose response read timed out.
    stale: Option<u8>,
}

impl<T: BulkTransport> CcidSession<T> {
    /// Create an unpowered session that takes ownership of `transport`.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport: Some(transport),
            config,
            slot: DEFAULT_SLOT,
            sequence: 0,
            state: PowerState::Unpowered,
            atr: None,
            stale: None,
        }
    }

    /// Start the sequence counter at `sequence` instead of zero.
    #[must_use]
    pub fn with_initial_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    /// Sequence number the next command frame will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// ATR returned by the last successful power-on.
    pub fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }

    /// Whether the transport is still held.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Apply power to the card and wait for it to settle.
    ///
    /// Returns the ATR. Powering an already powered card performs a cold
    /// reset.
    ///
    /// # Errors
    ///
    /// - `SessionError::Closed` if the transport was released
    /// - `SessionError::NoCard` if the reader reports an empty slot
    /// - `SessionError::CcidError` if the reader reports a failed command
    /// - `SessionError::UnexpectedMessageType` if the reply is not a DataBlock
    /// - `SessionError::ReadFailed`, `WriteFailed`, `Hardware` or
    ///   `TransportLost` for I/O failures
    ///
    /// The session is `Unpowered` after any failure.
    pub async fn power_on(&mut self) -> SessionResult<Bytes> {
        if self.transport.is_none() {
            return Err(SessionError::Closed);
        }

        self.state = PowerState::PoweringOn;
        self.atr = None;

        match self.try_power_on().await {
            Ok(atr) => {
                info!(slot = self.slot, atr = %hex::encode(&atr), "Card powered");
                self.state = PowerState::Powered;
                self.atr = Some(atr.clone());
                Ok(atr)
            }
            Err(e) => {
                warn!(slot = self.slot, error = %e, "Power-on failed");
                self.state = PowerState::Unpowered;
                Err(e)
            }
        }
    }

    async fn try_power_on(&mut self) -> SessionResult<Bytes> {
        let sequence = self.next_sequence();
        let command = CommandFrame::power_on(self.slot, sequence, VoltageSelect::Automatic);
        let response = self
            .exchange(command, self.config.power_on_response_len)
            .await?;

        if response.icc_status() == IccStatus::NotPresent {
            return Err(SessionError::NoCard {
                status: response.status,
            });
        }
        check_command_status(&response)?;
        expect_type(&response, CommandType::IccPowerOn)?;

        let settle = self.config.settle_delay();
        if !settle.is_zero() {
            debug!(delay_ms = self.config.settle_delay_ms, "Waiting for card to settle");
            tokio::time::sleep(settle).await;
        }

        Ok(response.payload)
    }

    /// Send one APDU and return the card's response.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidArgument` for an empty APDU
    /// - `SessionError::NotPowered` before a successful power-on
    /// - `SessionError::CcidError` if the reader reports a failed command
    /// - `SessionError::UnexpectedMessageType` if the reply is not a DataBlock
    /// - `SessionError::TruncatedResponse` if the reply declares more
    ///   payload than was read
    /// - `SessionError::SequenceMismatch` if the reply answers another
    ///   command; the session becomes `Unpowered`
    /// - `SessionError::TransportLost` if the device went away; the
    ///   transport is released
    ///
    /// The first two are checked before any I/O. A timeout leaves the
    /// session `Powered`.
    pub async fn transceive(&mut self, apdu: &[u8]) -> SessionResult<Bytes> {
        if apdu.is_empty() {
            return Err(SessionError::invalid_argument("APDU must not be empty"));
        }
        if !self.state.is_powered() {
            return Err(SessionError::NotPowered);
        }

        let sequence = self.next_sequence();
        let command = CommandFrame::xfr_block(
            self.slot,
            sequence,
            self.config.block_waiting_integer,
            0,
            apdu,
        );
        let response = self
            .exchange(command, self.config.max_response_len)
            .await?;

        check_command_status(&response)?;
        expect_type(&response, CommandType::XfrBlock)?;

        if !response.is_complete() {
            return Err(SessionError::TruncatedResponse {
                declared: response.data_length,
                available: response.available_len(),
            });
        }

        Ok(response.payload)
    }

    /// Query card presence without changing power state.
    ///
    /// # Errors
    ///
    /// - `SessionError::CcidError` if the command failed with a card present
    /// - `SessionError::UnexpectedMessageType` if the reply is not SlotStatus
    /// - I/O errors as for [`transceive`](Self::transceive)
    pub async fn slot_status(&mut self) -> SessionResult<IccStatus> {
        let sequence = self.next_sequence();
        let command = CommandFrame::get_slot_status(self.slot, sequence);
        let response = self
            .exchange(command, self.config.power_on_response_len)
            .await?;

        let icc = response.icc_status();
        if response.command_status().is_failure() && icc.is_present() {
            return Err(ccid_error(&response));
        }
        expect_type(&response, CommandType::GetSlotStatus)?;
        Ok(icc)
    }

    /// Remove power from the card.
    ///
    /// The session is `Unpowered` afterwards whether or not the reader
    /// acknowledged.
    ///
    /// # Errors
    ///
    /// Same as [`slot_status`](Self::slot_status).
    pub async fn power_off(&mut self) -> SessionResult<()> {
        let sequence = self.next_sequence();
        let command = CommandFrame::power_off(self.slot, sequence);
        let result = self
            .exchange(command, self.config.power_on_response_len)
            .await;

        self.state = PowerState::Unpowered;
        self.atr = None;

        let response = result?;
        check_command_status(&response)?;
        expect_type(&response, CommandType::IccPowerOff)?;
        debug!(slot = self.slot, "Card powered off");
        Ok(())
    }

    /// Power the card off if configured, then release the transport.
    ///
    /// Idempotent; never fails.
    pub async fn close(&mut self) {
        if self.transport.is_some() && self.state.is_powered() && self.config.power_off_on_close {
            if let Err(e) = self.power_off().await {
                debug!(error = %e, "Power-off during close failed");
            }
        }

        self.release_transport();
        self.state = PowerState::Unpowered;
        self.atr = None;
        self.stale = None;
    }

    fn next_sequence(&mut self) -> u8 {
        let sequence = self.sequence;
        self.sequence = sequence.wrapping_add(1);
        sequence
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.release();
            debug!(endpoints = %transport.endpoints(), "Transport released");
        }
    }

    /// Send `command` and read its response, following time extensions and
    /// skipping late responses to a command that already timed out.
    async fn exchange(
        &mut self,
        command: CommandFrame,
        read_len: usize,
    ) -> SessionResult<ResponseFrame> {
        let bytes = command.encode();
        trace!(command = %command, data = %hex::encode(&bytes), "CCID >>");
        self.write_frame(&bytes).await?;

        let mut extensions = 0u32;
        let mut discarded = 0u32;
        loop {
            let response = match self.read_frame(read_len).await {
                Ok(response) => response,
                Err(e) => {
                    if matches!(e, SessionError::Hardware(HardwareError::Timeout { .. })) {
                        self.stale = Some(command.sequence);
                    }
                    return Err(e);
                }
            };
            trace!(response = %response, data = %hex::encode(&response.payload), "CCID <<");

            if response.sequence != command.sequence
                && self.stale == Some(response.sequence)
                && discarded < self.config.max_time_extensions
            {
                discarded += 1;
                debug!(
                    sequence = response.sequence,
                    "Discarding late response to timed-out command"
                );
                continue;
            }

            if self.config.verify_sequence && response.sequence != command.sequence {
                warn!(
                    expected = command.sequence,
                    actual = response.sequence,
                    "Sequence mismatch, card needs power-on"
                );
                self.state = PowerState::Unpowered;
                self.atr = None;
                return Err(SessionError::SequenceMismatch {
                    expected: command.sequence,
                    actual: response.sequence,
                });
            }

            if response.command_status() != CommandStatus::TimeExtension {
                self.stale = None;
                return Ok(response);
            }

            extensions += 1;
            if extensions > self.config.max_time_extensions {
                return Err(SessionError::TimeExtensionLimit {
                    limit: self.config.max_time_extensions,
                });
            }
            debug!(
                multiplier = response.error,
                count = extensions,
                "Reader requested time extension"
            );
        }
    }

    async fn write_frame(&mut self, bytes: &[u8]) -> SessionResult<()> {
        let timeout = self.config.io_timeout();
        let result = match self.transport.as_mut() {
            Some(transport) => transport.write(bytes, timeout).await,
            None => return Err(SessionError::Closed),
        };

        let written = result.map_err(|e| self.transport_error(e))?;
        if written != bytes.len() {
            return Err(SessionError::WriteFailed {
                written,
                expected: bytes.len(),
            });
        }
        Ok(())
    }

    async fn read_frame(&mut self, max_len: usize) -> SessionResult<ResponseFrame> {
        let timeout = self.config.io_timeout();
        let result = match self.transport.as_mut() {
            Some(transport) => transport.read(max_len, timeout).await,
            None => return Err(SessionError::Closed),
        };

        let bytes = result.map_err(|e| self.transport_error(e))?;
        if bytes.len() < cardlink_core::constants::CCID_HEADER_LEN {
            return Err(SessionError::ReadFailed { len: bytes.len() });
        }
        Ok(decode_response(&bytes)?)
    }

    fn transport_error(&mut self, error: HardwareError) -> SessionError {
        match error {
            HardwareError::Disconnected { device } => {
                warn!(device = %device, "Reader disconnected, releasing transport");
                self.release_transport();
                self.state = PowerState::Unpowered;
                self.atr = None;
                SessionError::TransportLost(device)
            }
            other => SessionError::Hardware(other),
        }
    }
}

impl<T: BulkTransport> Drop for CcidSession<T> {
    fn drop(&mut self) {
        if self.transport.is_some() {
            debug!("Session dropped without close, releasing transport");
            self.release_transport();
        }
    }
}

fn ccid_error(response: &ResponseFrame) -> SessionError {
    SessionError::CcidError {
        status: response.status,
        error: response.error,
    }
}

fn check_command_status(response: &ResponseFrame) -> SessionResult<()> {
    if response.command_status().is_failure() {
        return Err(ccid_error(response));
    }
    Ok(())
}

fn expect_type(response: &ResponseFrame, command: CommandType) -> SessionResult<()> {
    let expected = command.expected_response();
    if response.response_type() != Some(expected) {
        return Err(SessionError::UnexpectedMessageType {
            expected: expected.as_u8(),
            actual: response.message_type,
        });
    }
    Ok(())
}
