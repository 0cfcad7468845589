//! One-shot resolution of asynchronous device permission requests.
//!
//! A `connect` that needs user consent calls [`PendingConnect::begin`],
//! hands the [`PermissionResponder`] to the host's permission API and waits
//! on the [`PermissionTicket`]. The host event later resolves the responder
//! exactly once. Only one request may be outstanding per `PendingConnect`;
//! a second `begin` fails with [`Error::ConnectPending`] instead of
//! replacing the first.
//!
//! ```
//! use cardlink_hardware::permission::{PendingConnect, PermissionOutcome};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pending = PendingConnect::new();
//! let (ticket, responder) = pending.begin("/dev/bus/usb/001/004").unwrap();
//! assert!(pending.begin("/dev/bus/usb/001/004").is_err());
//!
//! responder.grant();
//! assert_eq!(ticket.wait().await, PermissionOutcome::Granted);
//! assert!(!pending.is_pending());
//! # }
//! ```

use cardlink_core::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Result of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Access granted and the device is still attached.
    Granted,

    /// User or policy refused access.
    Denied,

    /// Access granted but the device reference is gone.
    DeviceLost,
}

impl PermissionOutcome {
    /// Turn the outcome into the `connect` result for `reader`.
    pub fn into_result(self, reader: &str) -> Result<()> {
        match self {
            Self::Granted => Ok(()),
            Self::Denied => Err(Error::PermissionDenied(reader.to_string())),
            Self::DeviceLost => Err(Error::DeviceLost(reader.to_string())),
        }
    }
}

/// Single-slot registry of the outstanding permission request.
///
/// Clones share the slot, so several readers can be made mutually exclusive
/// by constructing them with the same `PendingConnect`.
#[derive(Debug, Clone, Default)]
pub struct PendingConnect {
    slot: Arc<Mutex<Option<u64>>>,
    next_id: Arc<AtomicU64>,
}

impl PendingConnect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new request for `reader`.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConnectPending` if a request is already outstanding.
    pub fn begin(&self, reader: &str) -> Result<(PermissionTicket, PermissionResponder)> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = *slot {
            warn!(reader, pending_id = id, "Rejecting connect: permission request outstanding");
            return Err(Error::ConnectPending);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        *slot = Some(id);
        debug!(reader, id, "Permission request registered");

        let (tx, rx) = oneshot::channel();
        let ticket = PermissionTicket {
            id,
            rx,
            slot: Arc::clone(&self.slot),
        };
        let responder = PermissionResponder {
            id,
            reader: reader.to_string(),
            tx: Some(tx),
        };
        Ok((ticket, responder))
    }

    /// Whether a request is outstanding.
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

/// Waiting side of a permission request.
///
/// Dropping the ticket frees the slot, so a cancelled `connect` does not
/// block later ones.
#[derive(Debug)]
pub struct PermissionTicket {
    id: u64,
    rx: oneshot::Receiver<PermissionOutcome>,
    slot: Arc<Mutex<Option<u64>>>,
}

impl PermissionTicket {
    /// Wait for the outcome.
    ///
    /// A responder dropped without answering yields
    /// [`PermissionOutcome::DeviceLost`].
    pub async fn wait(mut self) -> PermissionOutcome {
        match (&mut self.rx).await {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!(id = self.id, "Permission responder dropped without answer");
                PermissionOutcome::DeviceLost
            }
        }
    }
}

impl Drop for PermissionTicket {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if *slot == Some(self.id) {
            *slot = None;
        }
    }
}

/// Resolving side of a permission request. Consumed on use.
#[derive(Debug)]
pub struct PermissionResponder {
    id: u64,
    reader: String,
    tx: Option<oneshot::Sender<PermissionOutcome>>,
}

impl PermissionResponder {
    /// Reader the request was made for.
    pub fn reader(&self) -> &str {
        &self.reader
    }

    pub fn resolve(mut self, outcome: PermissionOutcome) {
        debug!(reader = %self.reader, id = self.id, ?outcome, "Permission resolved");
        if let Some(tx) = self.tx.take() {
            if tx.send(outcome).is_err() {
                debug!(reader = %self.reader, "Connect no longer waiting for permission");
            }
        }
    }

    pub fn grant(self) {
        self.resolve(PermissionOutcome::Granted);
    }

    pub fn deny(self) {
        self.resolve(PermissionOutcome::Denied);
    }

    pub fn device_lost(self) {
        self.resolve(PermissionOutcome::DeviceLost);
    }
}
