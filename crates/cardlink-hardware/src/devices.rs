//! Enum wrapper for reader backend dispatch.
//!
//! Native `async fn` in traits is not object-safe, so `Box<dyn
//! SmartCardReader>` is unavailable. [`AnyReader`] provides concrete
//! dispatch over the backends compiled into this build instead, with
//! feature flags controlling which variants exist.
//!
//! # Examples
//!
//! ```
//! use cardlink_hardware::AnyReader;
//! use cardlink_hardware::mock::MockDeviceProvider;
//! use cardlink_hardware::traits::SmartCardReader;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> cardlink_core::Result<()> {
//! let (provider, handle) = MockDeviceProvider::new();
//! handle.add_reader("reader-0", true);
//!
//! let reader = AnyReader::mock(provider, Default::default());
//! assert_eq!(reader.list_readers().await?, vec!["reader-0".to_string()]);
//! # Ok(())
//! # }
//! ```

use crate::ccid_reader::CcidReader;
use crate::mock::MockDeviceProvider;
use crate::traits::SmartCardReader;
use cardlink_core::{Backend, ReaderConfig, Result, SessionConfig};

#[cfg(feature = "hardware-pcsc")]
use crate::pcsc_reader::PcscReader;
#[cfg(feature = "hardware-usb")]
use crate::usb::UsbDeviceProvider;

/// Enum wrapper for reader dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyReader {
    /// USB CCID through libusb.
    #[cfg(feature = "hardware-usb")]
    Usb(CcidReader<UsbDeviceProvider>),

    /// Platform PC/SC service.
    #[cfg(feature = "hardware-pcsc")]
    Pcsc(PcscReader),

    /// Scripted reader for development and testing.
    Mock(CcidReader<MockDeviceProvider>),
}

impl AnyReader {
    /// Build the reader selected by `config.backend`.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the backend was not compiled into this build
    /// - `Error::Discovery` if the backend's service cannot be initialised
    pub fn from_config(config: &ReaderConfig) -> Result<Self> {
        match config.backend {
            Backend::Usb => usb_reader(&config.session),
            Backend::Pcsc => pcsc_reader(),
        }
    }

    pub fn mock(provider: MockDeviceProvider, config: SessionConfig) -> Self {
        Self::Mock(CcidReader::new(provider, config))
    }

    /// Backend name for logs.
    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "hardware-usb")]
            Self::Usb(_) => Backend::Usb.as_str(),
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(_) => Backend::Pcsc.as_str(),
            Self::Mock(_) => "mock",
        }
    }
}

#[cfg(feature = "hardware-usb")]
fn usb_reader(session: &SessionConfig) -> Result<AnyReader> {
    let provider = UsbDeviceProvider::new()
        .map_err(|e| cardlink_core::Error::Discovery(e.to_string()))?;
    Ok(AnyReader::Usb(CcidReader::new(provider, session.clone())))
}

#[cfg(not(feature = "hardware-usb"))]
fn usb_reader(_session: &SessionConfig) -> Result<AnyReader> {
    Err(cardlink_core::Error::config(
        "usb backend not available: built without the hardware-usb feature",
    ))
}

#[cfg(feature = "hardware-pcsc")]
fn pcsc_reader() -> Result<AnyReader> {
    Ok(AnyReader::Pcsc(PcscReader::new()))
}

#[cfg(not(feature = "hardware-pcsc"))]
fn pcsc_reader() -> Result<AnyReader> {
    Err(cardlink_core::Error::config(
        "pcsc backend not available: built without the hardware-pcsc feature",
    ))
}

impl SmartCardReader for AnyReader {
    async fn list_readers(&self) -> Result<Vec<String>> {
        match self {
            #[cfg(feature = "hardware-usb")]
            Self::Usb(reader) => reader.list_readers().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(reader) => reader.list_readers().await,
            Self::Mock(reader) => reader.list_readers().await,
        }
    }

    async fn connect(&mut self, name: &str) -> Result<()> {
        match self {
            #[cfg(feature = "hardware-usb")]
            Self::Usb(reader) => reader.connect(name).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(reader) => reader.connect(name).await,
            Self::Mock(reader) => reader.connect(name).await,
        }
    }

    async fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        match self {
            #[cfg(feature = "hardware-usb")]
            Self::Usb(reader) => reader.transmit(apdu).await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(reader) => reader.transmit(apdu).await,
            Self::Mock(reader) => reader.transmit(apdu).await,
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        match self {
            #[cfg(feature = "hardware-usb")]
            Self::Usb(reader) => reader.disconnect().await,
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(reader) => reader.disconnect().await,
            Self::Mock(reader) => reader.disconnect().await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            #[cfg(feature = "hardware-usb")]
            Self::Usb(reader) => reader.is_connected(),
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(reader) => reader.is_connected(),
            Self::Mock(reader) => reader.is_connected(),
        }
    }

    fn atr(&self) -> Option<&[u8]> {
        match self {
            #[cfg(feature = "hardware-usb")]
            Self::Usb(reader) => reader.atr(),
            #[cfg(feature = "hardware-pcsc")]
            Self::Pcsc(reader) => reader.atr(),
            Self::Mock(reader) => reader.atr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_core::ErrorCode;

    #[tokio::test]
    async fn test_mock_dispatch() {
        let (provider, handle) = MockDeviceProvider::new();
        let card = handle.add_reader("reader-0", true);
        card.push_power_on([0x3B, 0x00]);
        card.push_response(crate::mock::MockResponse::data_block([0x90, 0x00]));

        let config = SessionConfig {
            settle_delay_ms: 0,
            ..SessionConfig::default()
        };
        let mut reader = AnyReader::mock(provider, config);
        assert_eq!(reader.backend_name(), "mock");

        reader.connect("reader-0").await.unwrap();
        assert_eq!(reader.atr(), Some(&[0x3B, 0x00][..]));
        let response = reader.transmit(&[0x00, 0xB0, 0x00, 0x00]).await.unwrap();
        assert_eq!(response, vec![0x90, 0x00]);

        reader.disconnect().await.unwrap();
        assert!(!reader.is_connected());
    }

    #[cfg(not(feature = "hardware-pcsc"))]
    #[test]
    fn test_missing_backend_is_config_error() {
        let config = ReaderConfig {
            backend: Backend::Pcsc,
            ..ReaderConfig::default()
        };
        let error = AnyReader::from_config(&config).unwrap_err();
        assert_eq!(error.code(), ErrorCode::ConfigError);
    }
}
