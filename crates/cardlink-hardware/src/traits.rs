//! Reader trait definitions.
//!
//! Three seams separate the layers of the stack:
//!
//! - [`BulkTransport`]: timed writes and reads on a claimed pair of bulk
//!   endpoints. The only layer that touches raw I/O.
//! - [`DeviceProvider`]: enumeration, permission negotiation and interface
//!   claim. Yields a transport for the CCID session.
//! - [`SmartCardReader`]: the `list_readers`/`connect`/`transmit`/`disconnect`
//!   surface applications call, implemented once over CCID and once over the
//!   platform's PC/SC service.
//!
//! All traits use native `async fn` methods (Rust 1.90 + Edition 2024 RPITIT).
//! They are not object-safe; use generics or the enum wrapper in
//! [`devices`](crate::devices) for dispatch.

#![allow(async_fn_in_trait)]

use crate::error::Result;
use crate::permission::PermissionResponder;
use crate::types::EndpointInfo;
use cardlink_core::ReaderDescriptor;
use std::time::Duration;

/// Duplex byte channel over two bulk endpoints.
///
/// Each call blocks the calling task for at most `timeout` and is never
/// retried. Content is not interpreted at this layer.
///
/// # Examples
///
/// ```no_run
/// use cardlink_hardware::traits::BulkTransport;
/// use cardlink_hardware::error::Result;
/// use std::time::Duration;
///
/// async fn echo<T: BulkTransport>(transport: &mut T, frame: &[u8]) -> Result<Vec<u8>> {
///     let timeout = Duration::from_secs(5);
///     transport.write(frame, timeout).await?;
///     transport.read(1024, timeout).await
/// }
/// ```
pub trait BulkTransport: Send {
    /// Write `data` to the bulk-out endpoint.
    ///
    /// Returns the number of bytes the device accepted, which may be less
    /// than `data.len()`.
    ///
    /// # Errors
    ///
    /// - `HardwareError::Timeout` if the transfer did not complete in time
    /// - `HardwareError::Disconnected` if the device is gone
    /// - any other `HardwareError` the transfer reported
    async fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize>;

    /// Read at most `max_len` bytes from the bulk-in endpoint.
    ///
    /// # Errors
    ///
    /// Same as [`write`](Self::write).
    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Endpoints this transport uses.
    fn endpoints(&self) -> EndpointInfo;

    /// Release the claimed interface. Idempotent.
    fn release(&mut self);
}

/// Source of CCID devices and the transports that reach them.
pub trait DeviceProvider: Send {
    type Transport: BulkTransport;

    /// List attached devices, readers or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the device service cannot be queried.
    async fn enumerate(&self) -> Result<Vec<ReaderDescriptor>>;

    /// Whether the host already allows opening `device`.
    async fn has_permission(&self, device: &ReaderDescriptor) -> bool;

    /// Ask the host for access to `device`.
    ///
    /// The provider must resolve `responder` exactly once, possibly long
    /// after this call returns. Dropping it unresolved reads as a lost
    /// device.
    fn request_permission(&mut self, device: &ReaderDescriptor, responder: PermissionResponder);

    /// Open `device`, claim its CCID interface and locate its bulk
    /// endpoints. Nothing stays claimed when this fails.
    ///
    /// # Errors
    ///
    /// - `HardwareError::Disconnected` or `NotFound` if the device vanished
    /// - `HardwareError::AccessDenied` if the host refused access
    /// - any other `HardwareError` for claim or endpoint failures
    async fn open(&mut self, device: &ReaderDescriptor) -> Result<Self::Transport>;
}

/// Application-facing smart-card reader.
///
/// At most one card session is active at a time. Errors are
/// [`cardlink_core::Error`] values whose [`code`](cardlink_core::Error::code)
/// is the stable identifier to branch on.
///
/// # Examples
///
/// ```no_run
/// use cardlink_hardware::traits::SmartCardReader;
///
/// async fn select_aid<R: SmartCardReader>(reader: &mut R) -> cardlink_core::Result<Vec<u8>> {
///     let names = reader.list_readers().await?;
///     let Some(name) = names.first() else {
///         return Err(cardlink_core::Error::DeviceNotFound("no readers".into()));
///     };
///
///     reader.connect(name).await?;
///     let response = reader.transmit(&[0x00, 0xA4, 0x04, 0x00]).await;
///     reader.disconnect().await?;
///     response
/// }
/// ```
pub trait SmartCardReader {
    /// Names of readers that can be passed to [`connect`](Self::connect).
    async fn list_readers(&self) -> cardlink_core::Result<Vec<String>>;

    /// Open a session with the card in `reader`, replacing any current one.
    ///
    /// Steps run in order (discovery, permission, claim, power-on) and the
    /// first failure aborts with nothing left claimed.
    async fn connect(&mut self, reader: &str) -> cardlink_core::Result<()>;

    /// Exchange one APDU with the connected card.
    async fn transmit(&mut self, apdu: &[u8]) -> cardlink_core::Result<Vec<u8>>;

    /// End the current session. Succeeds when nothing is connected.
    async fn disconnect(&mut self) -> cardlink_core::Result<()>;

    /// Whether a powered card session is active.
    fn is_connected(&self) -> bool;

    /// Answer-to-reset of the connected card, if known.
    fn atr(&self) -> Option<&[u8]>;
}
