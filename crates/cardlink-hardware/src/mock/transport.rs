//! Scripted bulk transport for testing the CCID session without a reader.
//!
//! Replies are queued on a [`MockTransportHandle`] and handed out one per
//! `read`. A read with nothing queued times out. Every frame written is
//! recorded so tests can inspect sequence numbers and parameters.

use crate::error::{HardwareError, Result};
use crate::traits::BulkTransport;
use crate::types::EndpointInfo;
use bytes::Bytes;
use cardlink_protocol::{ResponseFrame, ResponseType};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const MOCK_DEVICE: &str = "mock-ccid";

/// A response frame to be returned by the mock.
///
/// Unless overridden, the sequence number echoes the last command written,
/// and the declared length matches the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    message_type: u8,
    status: u8,
    error: u8,
    chain_parameter: u8,
    payload: Vec<u8>,
    declared_len: Option<u32>,
    sequence: Option<u8>,
}

impl MockResponse {
    /// `RDR_to_PC_DataBlock` carrying `payload` with a successful status.
    pub fn data_block(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            message_type: ResponseType::DataBlock.as_u8(),
            status: 0,
            error: 0,
            chain_parameter: 0,
            payload: payload.into(),
            declared_len: None,
            sequence: None,
        }
    }

    /// `RDR_to_PC_SlotStatus` with the given `bStatus`.
    pub fn slot_status(status: u8) -> Self {
        Self {
            message_type: ResponseType::SlotStatus.as_u8(),
            status,
            ..Self::data_block(Vec::new())
        }
    }

    /// Set `bStatus` and `bError`.
    #[must_use]
    pub fn with_status(mut self, status: u8, error: u8) -> Self {
        self.status = status;
        self.error = error;
        self
    }

    /// Override the declared payload length.
    #[must_use]
    pub fn with_declared_len(mut self, len: u32) -> Self {
        self.declared_len = Some(len);
        self
    }

    /// Answer with a fixed sequence number instead of echoing.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = Some(sequence);
        self
    }

    #[must_use]
    pub fn with_message_type(mut self, message_type: u8) -> Self {
        self.message_type = message_type;
        self
    }

    fn encode(&self, echo_sequence: u8) -> Bytes {
        ResponseFrame {
            message_type: self.message_type,
            data_length: self.declared_len.unwrap_or(self.payload.len() as u32),
            slot: 0,
            sequence: self.sequence.unwrap_or(echo_sequence),
            status: self.status,
            error: self.error,
            chain_parameter: self.chain_parameter,
            payload: Bytes::copy_from_slice(&self.payload),
        }
        .encode()
    }
}

/// What the next `read` produces.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response(MockResponse),

    /// Raw bytes returned as read.
    Raw(Vec<u8>),

    Timeout,
    Disconnected,
    Io(String),
}

/// Injected result for the next `write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockWrite {
    /// Accept only this many bytes.
    Short(usize),
    Timeout,
    Disconnected,
}

#[derive(Debug, Default)]
struct TransportState {
    replies: VecDeque<MockReply>,
    writes: VecDeque<MockWrite>,
    written: Vec<Vec<u8>>,
    last_sequence: u8,
    reads: usize,
    released: bool,
}

/// Mock bulk transport.
///
/// # Examples
///
/// ```
/// use cardlink_hardware::mock::{MockResponse, MockTransport};
/// use cardlink_hardware::traits::BulkTransport;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (mut transport, handle) = MockTransport::new();
/// handle.push_response(MockResponse::data_block([0x90, 0x00]));
///
/// let timeout = Duration::from_secs(1);
/// transport.write(&[0x6F, 2, 0, 0, 0, 0, 9, 4, 0, 0, 0x00, 0xB0], timeout).await.unwrap();
/// let reply = transport.read(64, timeout).await.unwrap();
/// assert_eq!(reply[6], 9);
/// assert_eq!(handle.written().len(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
    endpoints: EndpointInfo,
}

impl MockTransport {
    /// Create a transport and the handle that scripts it.
    pub fn new() -> (Self, MockTransportHandle) {
        let handle = MockTransportHandle::default();
        (handle.transport(), handle)
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BulkTransport for MockTransport {
    async fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let mut state = self.lock();
        if state.released {
            return Err(HardwareError::disconnected(MOCK_DEVICE));
        }

        let accepted = match state.writes.pop_front() {
            None => data.len(),
            Some(MockWrite::Short(n)) => n.min(data.len()),
            Some(MockWrite::Timeout) => {
                return Err(HardwareError::timeout(timeout.as_millis() as u64));
            }
            Some(MockWrite::Disconnected) => {
                return Err(HardwareError::disconnected(MOCK_DEVICE));
            }
        };

        if let Some(&sequence) = data.get(6) {
            state.last_sequence = sequence;
        }
        state.written.push(data.to_vec());
        Ok(accepted)
    }

    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.lock();
        if state.released {
            return Err(HardwareError::disconnected(MOCK_DEVICE));
        }
        state.reads += 1;

        let mut bytes = match state.replies.pop_front() {
            Some(MockReply::Response(response)) => response.encode(state.last_sequence).to_vec(),
            Some(MockReply::Raw(bytes)) => bytes,
            Some(MockReply::Timeout) | None => {
                return Err(HardwareError::timeout(timeout.as_millis() as u64));
            }
            Some(MockReply::Disconnected) => {
                return Err(HardwareError::disconnected(MOCK_DEVICE));
            }
            Some(MockReply::Io(message)) => {
                return Err(HardwareError::Io(std::io::Error::other(message)));
            }
        };
        bytes.truncate(max_len);
        Ok(bytes)
    }

    fn endpoints(&self) -> EndpointInfo {
        self.endpoints
    }

    fn release(&mut self) {
        self.lock().released = true;
    }
}

/// Handle for scripting and inspecting a [`MockTransport`].
#[derive(Debug, Clone, Default)]
pub struct MockTransportHandle {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransportHandle {
    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// New transport over the same script, as if the device were reopened.
    pub fn transport(&self) -> MockTransport {
        self.lock().released = false;
        MockTransport {
            state: Arc::clone(&self.state),
            endpoints: EndpointInfo::new(0, 0x82, 0x02),
        }
    }

    pub fn push_reply(&self, reply: MockReply) {
        self.lock().replies.push_back(reply);
    }

    pub fn push_response(&self, response: MockResponse) {
        self.push_reply(MockReply::Response(response));
    }

    /// Queue a successful power-on acknowledgement carrying `atr`.
    pub fn push_power_on(&self, atr: impl Into<Vec<u8>>) {
        self.push_response(MockResponse::data_block(atr));
    }

    pub fn push_write(&self, write: MockWrite) {
        self.lock().writes.push_back(write);
    }

    /// Frames written so far, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }

    /// Sequence bytes of the frames written so far.
    pub fn written_sequences(&self) -> Vec<u8> {
        self.lock()
            .written
            .iter()
            .filter_map(|frame| frame.get(6).copied())
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.lock().written.len()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    pub fn pending_replies(&self) -> usize {
        self.lock().replies.len()
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }
}
