//! Reader surface over the platform smart-card service (PC/SC).
//!
//! On hosts that run a smart-card service (WinSCard on Windows, the
//! CryptoTokenKit bridge on macOS, pcscd elsewhere) sessions are delegated
//! to it directly. No CCID framing happens in this process and the service
//! owns power management of the card.

use crate::traits::SmartCardReader;
use cardlink_core::{Error, Result};
use pcsc::{Attribute, Card, Context, Disposition, Protocols, Scope, ShareMode};
use std::ffi::CString;
use std::fmt;
use tokio::task;
use tracing::{debug, info, warn};

/// PC/SC implementation of [`SmartCardReader`].
#[derive(Default)]
pub struct PcscReader {
    context: Option<Context>,
    card: Option<Card>,
    reader_name: Option<String>,
    atr: Option<Vec<u8>>,
}

impl PcscReader {
    pub fn new() -> Self {
        Self::default()
    }

    async fn context(&mut self) -> Result<Context> {
        if let Some(context) = &self.context {
            return Ok(context.clone());
        }
        let context = establish().await?;
        self.context = Some(context.clone());
        Ok(context)
    }

    /// Name of the connected reader.
    pub fn reader_name(&self) -> Option<&str> {
        self.reader_name.as_deref()
    }
}

impl fmt::Debug for PcscReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscReader")
            .field("reader_name", &self.reader_name)
            .field("connected", &self.card.is_some())
            .finish_non_exhaustive()
    }
}

async fn establish() -> Result<Context> {
    task::spawn_blocking(|| Context::establish(Scope::User))
        .await
        .map_err(|err| join_error("establish context", err))?
        .map_err(|err| map_pcsc_error("establish context", "", err))
}

fn join_error(op: &str, err: task::JoinError) -> Error {
    Error::connection(format!("{op} task failed: {err}"))
}

impl SmartCardReader for PcscReader {
    async fn list_readers(&self) -> Result<Vec<String>> {
        let context = match &self.context {
            Some(context) => context.clone(),
            None => establish().await?,
        };

        let listed = task::spawn_blocking(move || context.list_readers_owned())
            .await
            .map_err(|err| join_error("list readers", err))?;
        let names = match listed {
            Ok(names) => names,
            Err(pcsc::Error::NoReadersAvailable) => Vec::new(),
            Err(err) => return Err(map_pcsc_error("list readers", "", err)),
        };

        let names: Vec<String> = names
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        debug!(count = names.len(), "Enumerated PC/SC readers");
        Ok(names)
    }

    async fn connect(&mut self, reader: &str) -> Result<()> {
        if self.card.is_some() {
            debug!("Replacing existing session");
            self.disconnect().await?;
        }

        let context = self.context().await?;
        let name = CString::new(reader)
            .map_err(|_| Error::invalid_argument("reader name contains a NUL byte"))?;

        let (card, atr) = task::spawn_blocking(move || {
            let card = context.connect(&name, ShareMode::Shared, Protocols::ANY)?;
            let atr = card.get_attribute_owned(Attribute::AtrString).ok();
            Ok::<_, pcsc::Error>((card, atr))
        })
        .await
        .map_err(|err| join_error("connect", err))?
        .map_err(|err| map_pcsc_error("connect", reader, err))?;

        self.atr = atr;
        self.card = Some(card);
        self.reader_name = Some(reader.to_string());
        info!(reader, "Connected");
        Ok(())
    }

    async fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        if apdu.is_empty() {
            return Err(Error::invalid_argument("APDU must not be empty"));
        }
        let card = self.card.take().ok_or(Error::NotConnected)?;
        let reader = self.reader_name.clone().unwrap_or_default();
        let command = apdu.to_vec();

        let (card, result) = task::spawn_blocking(move || {
            let mut buf = vec![0u8; pcsc::MAX_BUFFER_SIZE_EXTENDED];
            let result = card.transmit(&command, &mut buf).map(<[u8]>::to_vec);
            (card, result)
        })
        .await
        .map_err(|err| Error::transmit(format!("transmit task failed: {err}")))?;

        match result {
            Ok(response) => {
                self.card = Some(card);
                Ok(response)
            }
            Err(err @ (pcsc::Error::RemovedCard | pcsc::Error::ReaderUnavailable)) => {
                warn!(reader = %reader, %err, "Card session lost");
                drop(card);
                self.reader_name = None;
                self.atr = None;
                Err(Error::TransportLost(format!("{reader}: {err}")))
            }
            Err(err) => {
                self.card = Some(card);
                Err(Error::transmit(format!("{reader}: {err}")))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(card) = self.card.take() {
            let released = task::spawn_blocking(move || {
                card.disconnect(Disposition::LeaveCard).map_err(|(_card, err)| err)
            })
            .await;
            match released {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(%err, "PC/SC disconnect failed; handle dropped"),
                Err(err) => debug!(%err, "PC/SC disconnect task failed"),
            }
            info!(reader = ?self.reader_name, "Disconnected");
        }
        self.reader_name = None;
        self.atr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    fn atr(&self) -> Option<&[u8]> {
        self.atr.as_deref()
    }
}

/// Map a PC/SC error raised while connecting or enumerating.
fn map_pcsc_error(op: &str, reader: &str, err: pcsc::Error) -> Error {
    match err {
        pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard | pcsc::Error::UnpoweredCard => {
            Error::NoCard(format!("{reader}: {err}"))
        }
        pcsc::Error::UnknownReader | pcsc::Error::ReaderUnavailable => {
            Error::DeviceNotFound(format!("{reader}: {err}"))
        }
        pcsc::Error::NoService | pcsc::Error::ServiceStopped => {
            Error::Discovery(format!("{op}: {err}"))
        }
        other => Error::connection(format!("{op} {reader}: {other}")),
    }
}
