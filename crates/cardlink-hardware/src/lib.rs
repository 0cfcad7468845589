//! Smart-card reader access over USB CCID and PC/SC.
//!
//! This crate turns a reader name into a powered card session and moves
//! APDUs across it. Two backends are available:
//!
//! - **USB CCID** (`hardware-usb`, default): talks the CCID bulk protocol
//!   directly through libusb. [`CcidSession`] owns the claimed interface,
//!   the sequence counter and the slot power state.
//! - **PC/SC** (`hardware-pcsc`): delegates to the platform smart-card
//!   service, which already implements CCID.
//!
//! Both are exposed through the [`SmartCardReader`] trait, and
//! [`AnyReader`] picks one at runtime from a
//! [`ReaderConfig`](cardlink_core::ReaderConfig).
//!
//! # Connecting
//!
//! ```no_run
//! use cardlink_core::ReaderConfig;
//! use cardlink_hardware::{AnyReader, SmartCardReader};
//!
//! # async fn run() -> cardlink_core::Result<()> {
//! let mut reader = AnyReader::from_config(&ReaderConfig::default())?;
//! let Some(name) = reader.list_readers().await?.into_iter().next() else {
//!     return Ok(());
//! };
//!
//! reader.connect(&name).await?;
//! let response = reader.transmit(&[0x00, 0xA4, 0x04, 0x00]).await?;
//! if let Some(status_word) = response.last_chunk::<2>() {
//!     println!("SW = {status_word:02X?}");
//! }
//! reader.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Permissions
//!
//! Hosts that gate device access behind user consent answer
//! [`DeviceProvider::request_permission`] asynchronously. A connect waits
//! for the answer through a one-shot [`PendingConnect`] slot, and a second
//! connect started meanwhile fails with `CONNECT_PENDING`.
//!
//! # Errors
//!
//! Low-level operations return [`HardwareError`] or [`SessionError`]. The
//! reader surface maps them onto [`cardlink_core::Error`], whose
//! [`code`](cardlink_core::Error::code) is what callers match on.
//!
//! # Mock Implementations
//!
//! [`mock`] provides a scripted transport and device provider so sessions
//! and readers can be exercised without hardware.

pub mod ccid_reader;
pub mod devices;
pub mod error;
pub mod mock;
pub mod permission;
#[cfg(feature = "hardware-pcsc")]
pub mod pcsc_reader;
pub mod session;
pub mod traits;
pub mod types;
#[cfg(feature = "hardware-usb")]
pub mod usb;

// Re-export commonly used types for convenience
pub use ccid_reader::CcidReader;
pub use devices::AnyReader;
pub use error::{HardwareError, Result, SessionError};
pub use permission::{PendingConnect, PermissionOutcome, PermissionResponder, PermissionTicket};
pub use session::CcidSession;
pub use traits::{BulkTransport, DeviceProvider, SmartCardReader};
pub use types::EndpointInfo;

#[cfg(feature = "hardware-pcsc")]
pub use pcsc_reader::PcscReader;
#[cfg(feature = "hardware-usb")]
pub use usb::{UsbDeviceProvider, UsbTransport};
