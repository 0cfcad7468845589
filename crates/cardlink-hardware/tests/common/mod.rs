//! Common test utilities for session and reader integration tests.
//!
//! Everything here builds on the scripted mocks in
//! `cardlink_hardware::mock`, so no reader or card is needed.

#![allow(dead_code)]

use cardlink_core::SessionConfig;
use cardlink_hardware::mock::{MockDeviceProvider, MockProviderHandle, MockTransport, MockTransportHandle};
use cardlink_hardware::{CcidReader, CcidSession};

/// Reader name used across tests.
pub const READER: &str = "/dev/bus/usb/001/004";

/// ATR of a typical contact card.
pub const ATR: [u8; 11] = [
    0x3B, 0x8F, 0x80, 0x01, 0x80, 0x4F, 0x0C, 0xA0, 0x00, 0x00, 0x03,
];

/// SELECT by AID header.
pub const SELECT: [u8; 4] = [0x00, 0xA4, 0x04, 0x00];

/// Status word for success.
pub const SW_OK: [u8; 2] = [0x90, 0x00];

/// Session configuration without the post-power-on delay.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        settle_delay_ms: 0,
        ..SessionConfig::default()
    }
}

/// Unpowered session over a fresh mock transport.
pub fn session() -> (CcidSession<MockTransport>, MockTransportHandle) {
    session_with(fast_config())
}

pub fn session_with(config: SessionConfig) -> (CcidSession<MockTransport>, MockTransportHandle) {
    let (transport, handle) = MockTransport::new();
    (CcidSession::new(transport, config), handle)
}

/// Powered session; the power-on exchange used sequence 0.
pub async fn powered_session() -> (CcidSession<MockTransport>, MockTransportHandle) {
    let (mut session, handle) = session();
    handle.push_power_on(ATR);
    session
        .power_on()
        .await
        .expect("power-on should succeed");
    (session, handle)
}

/// Reader with one permitted CCID device named [`READER`].
pub fn reader() -> (
    CcidReader<MockDeviceProvider>,
    MockProviderHandle,
    MockTransportHandle,
) {
    let (provider, handle) = MockDeviceProvider::new();
    let card = handle.add_reader(READER, true);
    (CcidReader::new(provider, fast_config()), handle, card)
}

/// Message type byte of every frame written so far.
pub fn written_types(card: &MockTransportHandle) -> Vec<u8> {
    card.written().iter().map(|frame| frame[0]).collect()
}
