//! USB CCID transport backed by `rusb`.
//!
//! Readers are named after their usbfs node (`/dev/bus/usb/BBB/DDD`), so
//! names stay stable for as long as the device stays plugged in. libusb
//! transfers are blocking and run on tokio's blocking pool.

use crate::error::{HardwareError, Result};
use crate::permission::PermissionResponder;
use crate::traits::{BulkTransport, DeviceProvider};
use crate::types::EndpointInfo;
use cardlink_core::ReaderDescriptor;
use cardlink_core::constants::CCID_INTERFACE_CLASS;
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;
use tracing::{debug, trace, warn};

/// Claimed CCID interface on an open USB device.
pub struct UsbTransport {
    handle: Arc<DeviceHandle<Context>>,
    endpoints: EndpointInfo,
    device: String,
    claimed: bool,
}

impl UsbTransport {
    /// Claim `endpoints.interface` on `handle`.
    ///
    /// # Errors
    ///
    /// Returns the mapped `rusb` error if the interface cannot be claimed.
    pub fn claim(
        handle: DeviceHandle<Context>,
        endpoints: EndpointInfo,
        device: impl Into<String>,
    ) -> Result<Self> {
        let device = device.into();

        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            debug!(%err, "Kernel driver auto-detach unavailable; continuing");
        }
        handle
            .claim_interface(endpoints.interface)
            .map_err(|err| map_rusb_error("claim interface", &device, err, Duration::ZERO))?;

        debug!(device = %device, endpoints = %endpoints, "CCID interface claimed");
        Ok(Self {
            handle: Arc::new(handle),
            endpoints,
            device,
            claimed: true,
        })
    }
}

impl fmt::Debug for UsbTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbTransport")
            .field("device", &self.device)
            .field("endpoints", &self.endpoints)
            .field("claimed", &self.claimed)
            .finish()
    }
}

impl BulkTransport for UsbTransport {
    async fn write(&mut self, data: &[u8], timeout: Duration) -> Result<usize> {
        let handle = Arc::clone(&self.handle);
        let endpoint = self.endpoints.bulk_out;
        let data = data.to_vec();

        let written = task::spawn_blocking(move || handle.write_bulk(endpoint, &data, timeout))
            .await
            .map_err(|err| join_error("bulk-out write", err))?
            .map_err(|err| map_rusb_error("bulk-out write", &self.device, err, timeout))?;
        trace!(endpoint, written, "Bulk write complete");
        Ok(written)
    }

    async fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let handle = Arc::clone(&self.handle);
        let endpoint = self.endpoints.bulk_in;

        let data = task::spawn_blocking(move || {
            let mut buf = vec![0u8; max_len];
            let read = handle.read_bulk(endpoint, &mut buf, timeout)?;
            buf.truncate(read);
            Ok::<_, rusb::Error>(buf)
        })
        .await
        .map_err(|err| join_error("bulk-in read", err))?
        .map_err(|err| map_rusb_error("bulk-in read", &self.device, err, timeout))?;
        trace!(endpoint, read = data.len(), "Bulk read complete");
        Ok(data)
    }

    fn endpoints(&self) -> EndpointInfo {
        self.endpoints
    }

    fn release(&mut self) {
        if !self.claimed {
            return;
        }
        self.claimed = false;
        if let Err(err) = self.handle.release_interface(self.endpoints.interface) {
            debug!(device = %self.device, %err, "Interface release failed");
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.release();
    }
}

/// Enumerates USB devices through libusb.
///
/// libusb has no consent dialog: access is whatever the process's
/// permissions on the usbfs node allow, so permission requests are denied
/// immediately.
#[derive(Clone)]
pub struct UsbDeviceProvider {
    context: Context,
}

impl UsbDeviceProvider {
    /// Initialise a libusb context.
    ///
    /// # Errors
    ///
    /// Returns an error if libusb cannot be initialised.
    pub fn new() -> Result<Self> {
        let context = Context::new()
            .map_err(|err| map_rusb_error("initialise libusb", "usb", err, Duration::ZERO))?;
        Ok(Self { context })
    }
}

impl fmt::Debug for UsbDeviceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbDeviceProvider").finish_non_exhaustive()
    }
}

impl DeviceProvider for UsbDeviceProvider {
    type Transport = UsbTransport;

    async fn enumerate(&self) -> Result<Vec<ReaderDescriptor>> {
        let context = self.context.clone();
        task::spawn_blocking(move || {
            let devices = context
                .devices()
                .map_err(|err| map_rusb_error("list devices", "usb", err, Duration::ZERO))?;
            Ok::<_, HardwareError>(devices.iter().filter_map(|d| describe(&d)).collect::<Vec<_>>())
        })
        .await
        .map_err(|err| join_error("enumerate", err))?
    }

    async fn has_permission(&self, device: &ReaderDescriptor) -> bool {
        let context = self.context.clone();
        let name = device.name.clone();

        // A vanished device is reported by `open`, not here.
        task::spawn_blocking(move || {
            let Ok(usb_device) = find_device(&context, &name) else {
                return true;
            };
            !matches!(usb_device.open(), Err(rusb::Error::Access))
        })
        .await
        .unwrap_or(true)
    }

    fn request_permission(&mut self, device: &ReaderDescriptor, responder: PermissionResponder) {
        warn!(
            reader = %device.name,
            "No access to USB device; grant it with a udev rule or run with sufficient privileges"
        );
        responder.deny();
    }

    async fn open(&mut self, device: &ReaderDescriptor) -> Result<UsbTransport> {
        let context = self.context.clone();
        let name = device.name.clone();

        task::spawn_blocking(move || {
            let usb_device = find_device(&context, &name)?;
            let endpoints = find_ccid_endpoints(&usb_device, &name)?;
            let handle = usb_device
                .open()
                .map_err(|err| map_rusb_error("open device", &name, err, Duration::ZERO))?;
            UsbTransport::claim(handle, endpoints, name)
        })
        .await
        .map_err(|err| join_error("open", err))?
    }
}

/// Look up the attached device named `name`.
fn find_device(context: &Context, name: &str) -> Result<Device<Context>> {
    let devices = context
        .devices()
        .map_err(|err| map_rusb_error("list devices", name, err, Duration::ZERO))?;

    devices
        .iter()
        .find(|device| device_name(device) == name)
        .ok_or_else(|| HardwareError::disconnected(name))
}

/// usbfs path for `device`.
fn device_name<T: UsbContext>(device: &Device<T>) -> String {
    format!(
        "/dev/bus/usb/{:03}/{:03}",
        device.bus_number(),
        device.address()
    )
}

fn describe<T: UsbContext>(device: &Device<T>) -> Option<ReaderDescriptor> {
    let descriptor = device.device_descriptor().ok()?;
    let mut reader = ReaderDescriptor::new(device_name(device))
        .with_ids(descriptor.vendor_id(), descriptor.product_id());

    if descriptor.class_code() != 0 {
        reader = reader.with_interface_class(descriptor.class_code());
    }
    if let Ok(config) = device.active_config_descriptor() {
        for interface in config.interfaces() {
            for alt in interface.descriptors() {
                reader = reader.with_interface_class(alt.class_code());
            }
        }
    }
    Some(reader)
}

/// Locate the CCID interface and its bulk endpoint pair.
fn find_ccid_endpoints<T: UsbContext>(device: &Device<T>, name: &str) -> Result<EndpointInfo> {
    let config = device
        .active_config_descriptor()
        .map_err(|err| map_rusb_error("read configuration", name, err, Duration::ZERO))?;

    for interface in config.interfaces() {
        for alt in interface.descriptors() {
            if alt.class_code() != CCID_INTERFACE_CLASS {
                continue;
            }

            let mut bulk_in = None;
            let mut bulk_out = None;
            for endpoint in alt.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                let found = (endpoint.address(), endpoint.max_packet_size());
                match endpoint.direction() {
                    Direction::In => bulk_in = Some(found),
                    Direction::Out => bulk_out = Some(found),
                }
            }

            if let (Some((in_addr, in_size)), Some((out_addr, out_size))) = (bulk_in, bulk_out) {
                return Ok(
                    EndpointInfo::new(alt.interface_number(), in_addr, out_addr)
                        .with_max_packet_sizes(in_size, out_size),
                );
            }
        }
    }

    Err(HardwareError::communication(format!(
        "{name}: no CCID interface with bulk endpoints"
    )))
}

fn map_rusb_error(op: &str, device: &str, err: rusb::Error, timeout: Duration) -> HardwareError {
    match err {
        rusb::Error::Timeout => HardwareError::timeout(timeout.as_millis() as u64),
        rusb::Error::NoDevice => HardwareError::disconnected(device),
        rusb::Error::Access => HardwareError::access_denied(device),
        rusb::Error::NotFound => HardwareError::not_found(device),
        rusb::Error::Busy => HardwareError::Busy {
            device: device.to_string(),
        },
        other => HardwareError::communication(format!("{op}: {other}")),
    }
}

fn join_error(op: &str, err: task::JoinError) -> HardwareError {
    HardwareError::other(format!("{op} task join failed: {err}"))
}
