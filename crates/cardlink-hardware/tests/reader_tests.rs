//! Integration tests for the reader surface.
//!
//! Walks `list_readers`/`connect`/`transmit`/`disconnect` through the mock
//! provider and checks the error code reported for each failure path,
//! including the asynchronous permission handshake.

mod common;

use cardlink_core::{ErrorCode, ReaderDescriptor};
use cardlink_hardware::mock::{MockDeviceProvider, MockReply, MockResponse, PermissionPolicy};
use cardlink_hardware::{
    CcidReader, HardwareError, PendingConnect, PermissionOutcome, SmartCardReader,
};
use common::{ATR, READER, SELECT, SW_OK};
use rstest::rstest;

/// Yield until the provider has parked a permission request.
async fn wait_for_request(handle: &cardlink_hardware::mock::MockProviderHandle) {
    while !handle.has_pending_request() {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_list_readers_filters_non_ccid_devices() {
    let (reader, handle, _card) = common::reader();
    handle.add_device(ReaderDescriptor::new("/dev/bus/usb/001/002").with_interface_class(0x03));
    handle.add_reader("/dev/bus/usb/002/007", false);

    let names = reader.list_readers().await.unwrap();

    assert_eq!(names, vec![READER.to_string(), "/dev/bus/usb/002/007".to_string()]);
}

#[tokio::test]
async fn test_list_readers_when_service_fails() {
    let (reader, handle, _card) = common::reader();
    handle.fail_enumeration(Some("libusb unavailable"));

    let err = reader.list_readers().await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::Unavailable);
}

#[rstest]
#[case("/dev/bus/usb/009/009")]
#[case("/dev/bus/usb/001/002")]
#[tokio::test]
async fn test_connect_unknown_or_non_ccid_device(#[case] name: &str) {
    let (mut reader, handle, _card) = common::reader();
    handle.add_device(ReaderDescriptor::new("/dev/bus/usb/001/002").with_interface_class(0x03));

    let err = reader.connect(name).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::DeviceNotFound);
    assert_eq!(handle.open_count(), 0);
}

#[tokio::test]
async fn test_connect_after_reader_unplugged() {
    let (mut reader, handle, _card) = common::reader();
    assert_eq!(reader.list_readers().await.unwrap(), vec![READER.to_string()]);

    handle.remove_device(READER);
    let err = reader.connect(READER).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::DeviceNotFound);
    assert!(reader.list_readers().await.unwrap().is_empty());
}

// ============================================================================
// Connect, transmit, disconnect
// ============================================================================

#[tokio::test]
async fn test_connect_transmit_disconnect() {
    let (mut reader, handle, card) = common::reader();
    card.push_power_on(ATR);
    card.push_response(MockResponse::data_block([0x6F, 0x00, 0x90, 0x00]));

    reader.connect(READER).await.unwrap();
    assert!(reader.is_connected());
    assert_eq!(reader.atr(), Some(&ATR[..]));
    assert_eq!(reader.reader_name(), Some(READER));
    assert_eq!(handle.permission_requests(), 0);

    let response = reader.transmit(&SELECT).await.unwrap();
    assert_eq!(response, vec![0x6F, 0x00, 0x90, 0x00]);

    reader.disconnect().await.unwrap();
    assert!(!reader.is_connected());
    assert!(reader.atr().is_none());
    assert!(card.is_released());
    assert_eq!(common::written_types(&card), vec![0x62, 0x6F, 0x63]);
}

#[tokio::test]
async fn test_disconnect_without_connection_is_ok() {
    let (mut reader, _handle, card) = common::reader();

    reader.disconnect().await.unwrap();
    reader.disconnect().await.unwrap();

    assert_eq!(card.write_count(), 0);
}

#[tokio::test]
async fn test_connect_replaces_existing_session() {
    let (mut reader, handle, card) = common::reader();
    card.push_power_on(ATR);
    card.push_response(MockResponse::slot_status(0x01));
    card.push_power_on([0x3B, 0x00]);

    reader.connect(READER).await.unwrap();
    reader.connect(READER).await.unwrap();

    assert_eq!(reader.atr(), Some(&[0x3B, 0x00][..]));
    assert_eq!(handle.open_count(), 2);
    assert_eq!(common::written_types(&card), vec![0x62, 0x63, 0x62]);
}

#[tokio::test]
async fn test_transmit_before_connect() {
    let (mut reader, _handle, card) = common::reader();

    let err = reader.transmit(&SELECT).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::NotConnected);
    assert_eq!(card.write_count(), 0);
}

#[tokio::test]
async fn test_transmit_empty_apdu() {
    let (mut reader, _handle, card) = common::reader();
    card.push_power_on(ATR);
    reader.connect(READER).await.unwrap();

    let err = reader.transmit(&[]).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(reader.is_connected());
}

#[tokio::test]
async fn test_transmit_reader_failure_keeps_session() {
    let (mut reader, _handle, card) = common::reader();
    card.push_power_on(ATR);
    card.push_response(MockResponse::data_block(Vec::new()).with_status(0x40, 0x01));
    card.push_response(MockResponse::data_block(SW_OK));
    reader.connect(READER).await.unwrap();

    let err = reader.transmit(&SELECT).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::TransmitFailed);
    assert!(matches!(
        err,
        cardlink_core::Error::ProtocolStatus {
            status: 0x40,
            error: 0x01
        }
    ));
    assert_eq!(reader.transmit(&SELECT).await.unwrap(), SW_OK.to_vec());
}

#[tokio::test]
async fn test_transmit_timeout() {
    let (mut reader, _handle, card) = common::reader();
    card.push_power_on(ATR);
    reader.connect(READER).await.unwrap();

    let err = reader.transmit(&SELECT).await.unwrap_err();

    assert!(matches!(err, cardlink_core::Error::Timeout { .. }));
    assert!(reader.is_connected());
}

#[tokio::test]
async fn test_transmit_io_error_keeps_session() {
    let (mut reader, _handle, card) = common::reader();
    card.push_power_on(ATR);
    card.push_reply(MockReply::Io("bulk-in stall".into()));
    reader.connect(READER).await.unwrap();

    let err = reader.transmit(&SELECT).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::TransmitFailed);
    assert!(!err.is_transport_lost());
    assert!(reader.is_connected());
}

#[tokio::test]
async fn test_transport_loss_drops_session() {
    let (mut reader, _handle, card) = common::reader();
    card.push_power_on(ATR);
    card.push_reply(MockReply::Disconnected);
    reader.connect(READER).await.unwrap();

    let err = reader.transmit(&SELECT).await.unwrap_err();

    assert!(err.is_transport_lost());
    assert_eq!(err.code(), ErrorCode::TransmitFailed);
    assert!(!reader.is_connected());
    assert!(reader.session().is_none());
    assert!(card.is_released());

    let err = reader.transmit(&SELECT).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotConnected);
}

#[tokio::test]
async fn test_reconnect_after_transport_loss() {
    let (mut reader, _handle, card) = common::reader();
    card.push_power_on(ATR);
    card.push_reply(MockReply::Disconnected);
    card.push_power_on(ATR);
    reader.connect(READER).await.unwrap();
    assert!(reader.transmit(&SELECT).await.is_err());

    reader.connect(READER).await.unwrap();

    assert!(reader.is_connected());
    assert!(!card.is_released());
}

// ============================================================================
// Connect failures
// ============================================================================

#[tokio::test]
async fn test_connect_without_card() {
    let (mut reader, _handle, card) = common::reader();
    card.push_response(MockResponse::slot_status(0x42).with_status(0x42, 0xFE));

    let err = reader.connect(READER).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::NoCard);
    assert!(!reader.is_connected());
    assert!(card.is_released());
}

#[tokio::test]
async fn test_connect_power_on_failure() {
    let (mut reader, _handle, card) = common::reader();
    card.push_response(MockResponse::data_block(Vec::new()).with_status(0x40, 0xFB));

    let err = reader.connect(READER).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::ConnectionFailed);
    assert!(card.is_released());
}

#[rstest]
#[case(HardwareError::access_denied(READER), ErrorCode::PermissionDenied)]
#[case(HardwareError::disconnected(READER), ErrorCode::DeviceLost)]
#[case(HardwareError::Busy { device: READER.into() }, ErrorCode::ConnectionFailed)]
#[case(HardwareError::communication("claim interface"), ErrorCode::ConnectionFailed)]
#[tokio::test]
async fn test_connect_open_failure(#[case] error: HardwareError, #[case] expected: ErrorCode) {
    let (mut reader, handle, card) = common::reader();
    handle.fail_next_open(error);

    let err = reader.connect(READER).await.unwrap_err();

    assert_eq!(err.code(), expected);
    assert_eq!(card.write_count(), 0);
    assert!(!reader.is_connected());
}

// ============================================================================
// Permission handshake
// ============================================================================

#[rstest]
#[case(PermissionPolicy::Deny, ErrorCode::PermissionDenied)]
#[case(PermissionPolicy::Lose, ErrorCode::DeviceLost)]
#[tokio::test]
async fn test_permission_refused(#[case] policy: PermissionPolicy, #[case] expected: ErrorCode) {
    let (mut reader, handle, card) = common::reader();
    handle.set_permitted(READER, false);
    handle.set_policy(policy);

    let err = reader.connect(READER).await.unwrap_err();

    assert_eq!(err.code(), expected);
    assert_eq!(handle.permission_requests(), 1);
    assert_eq!(handle.open_count(), 0);
    assert_eq!(card.write_count(), 0);
}

#[tokio::test]
async fn test_permission_granted_immediately() {
    let (mut reader, handle, card) = common::reader();
    handle.set_permitted(READER, false);
    card.push_power_on(ATR);

    reader.connect(READER).await.unwrap();

    assert!(reader.is_connected());
    assert_eq!(handle.permission_requests(), 1);
}

#[tokio::test]
async fn test_permission_granted_asynchronously() {
    let (mut reader, handle, card) = common::reader();
    handle.set_permitted(READER, false);
    handle.set_policy(PermissionPolicy::Manual);
    card.push_power_on(ATR);

    let (result, resolved) = tokio::join!(reader.connect(READER), async {
        wait_for_request(&handle).await;
        handle.resolve_pending(PermissionOutcome::Granted)
    });

    assert!(resolved);
    result.unwrap();
    assert!(reader.is_connected());
}

#[tokio::test]
async fn test_abandoned_permission_request_is_device_lost() {
    let (mut reader, handle, _card) = common::reader();
    handle.set_permitted(READER, false);
    handle.set_policy(PermissionPolicy::Manual);

    let (result, abandoned) = tokio::join!(reader.connect(READER), async {
        wait_for_request(&handle).await;
        handle.abandon_pending()
    });

    assert!(abandoned);
    assert_eq!(result.unwrap_err().code(), ErrorCode::DeviceLost);
}

#[tokio::test]
async fn test_second_connect_while_permission_pending() {
    let (provider, handle) = MockDeviceProvider::new();
    let card = handle.add_reader(READER, false);
    handle.set_policy(PermissionPolicy::Manual);
    card.push_power_on(ATR);

    let pending = PendingConnect::new();
    let mut first =
        CcidReader::with_pending_connect(provider.clone(), common::fast_config(), pending.clone());
    let mut second = CcidReader::with_pending_connect(provider, common::fast_config(), pending.clone());

    let (first_result, second_result) = tokio::join!(first.connect(READER), async {
        wait_for_request(&handle).await;
        let result = second.connect(READER).await;
        handle.resolve_pending(PermissionOutcome::Granted);
        result
    });

    assert_eq!(second_result.unwrap_err().code(), ErrorCode::ConnectPending);
    first_result.unwrap();
    assert!(first.is_connected());
    assert!(!pending.is_pending());
    assert_eq!(handle.permission_requests(), 1);
}

#[tokio::test]
async fn test_permission_slot_freed_after_denial() {
    let (mut reader, handle, card) = common::reader();
    handle.set_permitted(READER, false);
    handle.set_policy(PermissionPolicy::Deny);
    assert!(reader.connect(READER).await.is_err());

    handle.set_policy(PermissionPolicy::Grant);
    card.push_power_on(ATR);
    reader.connect(READER).await.unwrap();

    assert!(reader.is_connected());
    assert_eq!(handle.permission_requests(), 2);
}
