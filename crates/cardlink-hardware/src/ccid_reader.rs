//! Reader surface over USB CCID.
//!
//! [`CcidReader`] combines a [`DeviceProvider`] with a [`CcidSession`].
//! `connect` runs discovery, permission, interface claim and power-on in
//! that order and stops at the first failure with nothing left claimed.

use crate::permission::PendingConnect;
use crate::session::CcidSession;
use crate::traits::{DeviceProvider, SmartCardReader};
use cardlink_core::{Error, ReaderDescriptor, Result, SessionConfig};
use std::fmt;
use tracing::{debug, error, info, warn};

/// CCID implementation of [`SmartCardReader`].
///
/// # Examples
///
/// ```
/// use cardlink_core::SessionConfig;
/// use cardlink_hardware::CcidReader;
/// use cardlink_hardware::mock::MockDeviceProvider;
/// use cardlink_hardware::traits::SmartCardReader;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cardlink_core::Result<()> {
/// let (provider, handle) = MockDeviceProvider::new();
/// let card = handle.add_reader("/dev/bus/usb/001/004", true);
/// card.push_power_on([0x3B, 0x00]);
///
/// let config = SessionConfig { settle_delay_ms: 0, ..SessionConfig::default() };
/// let mut reader = CcidReader::new(provider, config);
/// reader.connect("/dev/bus/usb/001/004").await?;
/// assert!(reader.is_connected());
///
/// reader.disconnect().await?;
/// assert!(!reader.is_connected());
/// # Ok(())
/// # }
/// ```
pub struct CcidReader<P: DeviceProvider> {
    provider: P,
    config: SessionConfig,
    pending: PendingConnect,
    session: Option<CcidSession<P::Transport>>,
    reader_name: Option<String>,
}

impl<P: DeviceProvider> CcidReader<P> {
    pub fn new(provider: P, config: SessionConfig) -> Self {
        Self::with_pending_connect(provider, config, PendingConnect::new())
    }

    /// Create a reader whose permission requests share `pending` with
    /// other readers, so at most one of them waits for consent at a time.
    pub fn with_pending_connect(
        provider: P,
        config: SessionConfig,
        pending: PendingConnect,
    ) -> Self {
        Self {
            provider,
            config,
            pending,
            session: None,
            reader_name: None,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Name of the connected reader.
    pub fn reader_name(&self) -> Option<&str> {
        self.reader_name.as_deref()
    }

    /// Active session, if any.
    pub fn session(&self) -> Option<&CcidSession<P::Transport>> {
        self.session.as_ref()
    }

    async fn find_reader(&self, name: &str) -> Result<ReaderDescriptor> {
        let devices = self
            .provider
            .enumerate()
            .await
            .map_err(|e| Error::Discovery(e.to_string()))?;

        devices
            .into_iter()
            .find(|d| d.name == name && d.is_smart_card_reader())
            .ok_or_else(|| Error::DeviceNotFound(name.to_string()))
    }

    async fn ensure_permission(&mut self, device: &ReaderDescriptor) -> Result<()> {
        if self.provider.has_permission(device).await {
            return Ok(());
        }

        let (ticket, responder) = self.pending.begin(&device.name)?;
        info!(reader = %device.name, "Requesting device permission");
        self.provider.request_permission(device, responder);

        let outcome = ticket.wait().await;
        debug!(reader = %device.name, ?outcome, "Permission request finished");
        outcome.into_result(&device.name)
    }
}

impl<P: DeviceProvider> fmt::Debug for CcidReader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CcidReader")
            .field("reader_name", &self.reader_name)
            .field("state", &self.session.as_ref().map(CcidSession::state))
            .field("permission_pending", &self.pending.is_pending())
            .finish_non_exhaustive()
    }
}

impl<P: DeviceProvider> SmartCardReader for CcidReader<P> {
    async fn list_readers(&self) -> Result<Vec<String>> {
        let devices = self
            .provider
            .enumerate()
            .await
            .map_err(|e| Error::Discovery(e.to_string()))?;

        let names: Vec<String> = devices
            .into_iter()
            .filter(ReaderDescriptor::is_smart_card_reader)
            .map(|d| d.name)
            .collect();
        debug!(count = names.len(), "Enumerated CCID readers");
        Ok(names)
    }

    async fn connect(&mut self, reader: &str) -> Result<()> {
        if self.session.is_some() {
            debug!("Replacing existing session");
            self.disconnect().await?;
        }

        let device = self.find_reader(reader).await?;
        self.ensure_permission(&device).await?;

        let transport = self
            .provider
            .open(&device)
            .await
            .map_err(|e| e.into_open_error(reader))?;

        let mut session = CcidSession::new(transport, self.config.clone());
        if let Err(e) = session.power_on().await {
            error!(reader, error = %e, "Power-on failed, releasing interface");
            session.close().await;
            return Err(e.into_connect_error(reader));
        }

        info!(reader, "Connected");
        self.session = Some(session);
        self.reader_name = Some(reader.to_string());
        Ok(())
    }

    async fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        let session = self.session.as_mut().ok_or(Error::NotConnected)?;

        match session.transceive(apdu).await {
            Ok(response) => Ok(response.to_vec()),
            Err(e) => {
                if e.is_transport_lost() {
                    warn!(reader = ?self.reader_name, error = %e, "Transport lost, dropping session");
                    self.session = None;
                    self.reader_name = None;
                }
                Err(e.into_transmit_error())
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.close().await;
            info!(reader = ?self.reader_name, "Disconnected");
        }
        self.reader_name = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.state().is_powered())
    }

    fn atr(&self) -> Option<&[u8]> {
        self.session.as_ref().and_then(CcidSession::atr)
    }
}
