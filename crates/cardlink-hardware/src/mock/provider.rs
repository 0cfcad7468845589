//! Mock device provider for testing discovery, permission and connect.
//!
//! Devices are registered on a [`MockProviderHandle`], each with its own
//! scripted [`MockTransport`]. Permission requests follow a
//! [`PermissionPolicy`]; with [`PermissionPolicy::Manual`] the responder is
//! parked on the handle until the test resolves it, which is how the
//! asynchronous consent dialog of a real host is simulated.

use crate::error::{HardwareError, Result};
use crate::mock::transport::{MockTransport, MockTransportHandle};
use crate::permission::{PermissionOutcome, PermissionResponder};
use crate::traits::DeviceProvider;
use cardlink_core::ReaderDescriptor;
use cardlink_core::constants::CCID_INTERFACE_CLASS;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// How the mock answers permission requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionPolicy {
    /// Grant immediately and remember the grant.
    #[default]
    Grant,
    Deny,

    /// Resolve as if the device vanished during the dialog.
    Lose,

    /// Park the responder until [`MockProviderHandle::resolve_pending`].
    Manual,
}

#[derive(Debug)]
struct MockDevice {
    descriptor: ReaderDescriptor,
    permitted: bool,
    transport: MockTransportHandle,
}

#[derive(Debug, Default)]
struct ProviderState {
    devices: Vec<MockDevice>,
    policy: PermissionPolicy,
    parked: Option<PermissionResponder>,
    permission_requests: usize,
    open_failures: VecDeque<HardwareError>,
    enumerate_failure: Option<String>,
    opened: usize,
}

/// Mock [`DeviceProvider`].
///
/// # Examples
///
/// ```
/// use cardlink_hardware::mock::MockDeviceProvider;
/// use cardlink_hardware::traits::DeviceProvider;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (provider, handle) = MockDeviceProvider::new();
/// handle.add_reader("/dev/bus/usb/001/004", true);
/// handle.add_device(cardlink_core::ReaderDescriptor::new("keyboard").with_interface_class(0x03));
///
/// let devices = provider.enumerate().await.unwrap();
/// assert_eq!(devices.len(), 2);
/// assert!(devices[0].is_smart_card_reader());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MockDeviceProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockDeviceProvider {
    /// Create a provider and the handle that controls it.
    pub fn new() -> (Self, MockProviderHandle) {
        let state = Arc::new(Mutex::new(ProviderState::default()));
        let provider = Self {
            state: Arc::clone(&state),
        };
        (provider, MockProviderHandle { state })
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceProvider for MockDeviceProvider {
    type Transport = MockTransport;

    async fn enumerate(&self) -> Result<Vec<ReaderDescriptor>> {
        let state = self.lock();
        if let Some(message) = &state.enumerate_failure {
            return Err(HardwareError::other(message.clone()));
        }
        Ok(state
            .devices
            .iter()
            .map(|device| device.descriptor.clone())
            .collect())
    }

    async fn has_permission(&self, device: &ReaderDescriptor) -> bool {
        self.lock()
            .devices
            .iter()
            .any(|d| d.descriptor.name == device.name && d.permitted)
    }

    fn request_permission(&mut self, device: &ReaderDescriptor, responder: PermissionResponder) {
        let mut state = self.lock();
        state.permission_requests += 1;

        let policy = state.policy;
        match policy {
            PermissionPolicy::Grant => {
                if let Some(d) = state
                    .devices
                    .iter_mut()
                    .find(|d| d.descriptor.name == device.name)
                {
                    d.permitted = true;
                }
                drop(state);
                responder.grant();
            }
            PermissionPolicy::Deny => {
                drop(state);
                responder.deny();
            }
            PermissionPolicy::Lose => {
                drop(state);
                responder.device_lost();
            }
            PermissionPolicy::Manual => state.parked = Some(responder),
        }
    }

    async fn open(&mut self, device: &ReaderDescriptor) -> Result<MockTransport> {
        let mut state = self.lock();
        if let Some(error) = state.open_failures.pop_front() {
            return Err(error);
        }

        let transport = state
            .devices
            .iter()
            .find(|d| d.descriptor.name == device.name)
            .map(|d| d.transport.transport())
            .ok_or_else(|| HardwareError::disconnected(device.name.clone()))?;
        state.opened += 1;
        Ok(transport)
    }
}

/// Handle for controlling a [`MockDeviceProvider`].
#[derive(Debug, Clone)]
pub struct MockProviderHandle {
    state: Arc<Mutex<ProviderState>>,
}

impl MockProviderHandle {
    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a device. Returns the handle scripting its transport.
    pub fn add_device(&self, descriptor: ReaderDescriptor) -> MockTransportHandle {
        let transport = MockTransportHandle::default();
        self.lock().devices.push(MockDevice {
            descriptor,
            permitted: false,
            transport: transport.clone(),
        });
        transport
    }

    /// Attach a CCID reader named `name`.
    pub fn add_reader(&self, name: &str, permitted: bool) -> MockTransportHandle {
        let descriptor = ReaderDescriptor::new(name)
            .with_ids(0x072F, 0x90CC)
            .with_interface_class(CCID_INTERFACE_CLASS);
        let transport = self.add_device(descriptor);
        if permitted {
            self.set_permitted(name, true);
        }
        transport
    }

    /// Detach the device named `name`.
    pub fn remove_device(&self, name: &str) {
        self.lock().devices.retain(|d| d.descriptor.name != name);
    }

    pub fn set_permitted(&self, name: &str, permitted: bool) {
        if let Some(device) = self
            .lock()
            .devices
            .iter_mut()
            .find(|d| d.descriptor.name == name)
        {
            device.permitted = permitted;
        }
    }

    pub fn set_policy(&self, policy: PermissionPolicy) {
        self.lock().policy = policy;
    }

    /// Make the next `open` fail with `error`.
    pub fn fail_next_open(&self, error: HardwareError) {
        self.lock().open_failures.push_back(error);
    }

    /// Make `enumerate` fail until cleared with `None`.
    pub fn fail_enumeration(&self, message: Option<&str>) {
        self.lock().enumerate_failure = message.map(str::to_string);
    }

    /// Whether a permission request is parked.
    pub fn has_pending_request(&self) -> bool {
        self.lock().parked.is_some()
    }

    /// Resolve the parked permission request. Returns `false` if none.
    pub fn resolve_pending(&self, outcome: PermissionOutcome) -> bool {
        let parked = self.lock().parked.take();
        match parked {
            Some(responder) => {
                if outcome == PermissionOutcome::Granted {
                    self.set_permitted(responder.reader(), true);
                }
                responder.resolve(outcome);
                true
            }
            None => false,
        }
    }

    /// Drop the parked responder without answering.
    pub fn abandon_pending(&self) -> bool {
        self.lock().parked.take().is_some()
    }

    pub fn permission_requests(&self) -> usize {
        self.lock().permission_requests
    }

    pub fn open_count(&self) -> usize {
        self.lock().opened
    }
}
