//! USB transport using the `nusb` crate
//!
//! Receipt printers expose a USB Printer class (bInterfaceClass = 7)
//! interface, or a vendor-specific one, with a bulk OUT endpoint that takes
//! the print stream. Opening the device node requires OS permission; see
//! [`crate::permission`].

use super::Transport;
use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use nusb::hotplug::HotplugEvent;
use nusb::transfer::{Direction, EndpointType};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

/// USB Printer class code (bDeviceClass / bInterfaceClass)
pub const USB_CLASS_PRINTER: u8 = 7;

/// Snapshot of one attached USB device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub bus_number: u8,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub class: u8,
    /// Class of each interface, in descriptor order
    pub interface_classes: Vec<u8>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl UsbDeviceInfo {
    /// Numeric id, unique among currently attached devices
    pub fn device_id(&self) -> u32 {
        u32::from(self.bus_number) * 1000 + u32::from(self.device_address)
    }

    /// Stable `VID:PID` in uppercase hex
    pub fn usb_device_id(&self) -> String {
        format!("{:04X}:{:04X}", self.vendor_id, self.product_id)
    }

    /// OS device node path; changes on every re-attach
    pub fn device_path(&self) -> String {
        format!("/dev/bus/usb/{:03}/{:03}", self.bus_number, self.device_address)
    }

    /// Key for per-device permission bookkeeping
    pub fn identity(&self) -> String {
        format!("{}@{}", self.usb_device_id(), self.device_path())
    }

    fn from_nusb(info: &nusb::DeviceInfo) -> Self {
        Self {
            bus_number: info.bus_number(),
            device_address: info.device_address(),
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            class: info.class(),
            interface_classes: info.interfaces().map(|i| i.class()).collect(),
            manufacturer: info.manufacturer_string().map(str::to_string),
            product: info.product_string().map(str::to_string),
        }
    }
}

/// Attach/detach notification from the OS
#[derive(Debug, Clone)]
pub enum UsbEvent {
    Attached(UsbDeviceInfo),
    /// Opaque OS identifier of the removed device
    Detached(String),
}

/// Platform USB host services
///
/// All methods except [`UsbHost::watch`] may block briefly on syscalls.
pub trait UsbHost: Send + Sync {
    /// Enumerate attached devices
    fn list_devices(&self) -> PrintResult<Vec<UsbDeviceInfo>>;

    /// Whether this process may open the device right now
    fn has_permission(&self, device: &UsbDeviceInfo) -> bool;

    /// Ask the OS (or user) for access. The answer arrives on `reply`; it may
    /// never arrive, and callers must re-check [`UsbHost::has_permission`].
    fn request_permission(&self, device: &UsbDeviceInfo, reply: oneshot::Sender<bool>);

    /// Subscribe to attach/detach events
    fn watch(&self) -> PrintResult<BoxStream<'static, UsbEvent>>;

    /// Open the device and claim its print interface
    fn open(&self, device: &UsbDeviceInfo) -> PrintResult<Box<dyn UsbLink>>;
}

/// Claimed bulk OUT channel to one device
pub trait UsbLink: Send {
    /// Submit one bulk OUT transfer
    fn write(&mut self, data: Vec<u8>) -> BoxFuture<'_, PrintResult<()>>;

    /// Release the interface
    fn close(&mut self);
}

/// [`UsbHost`] backed by the OS through `nusb`
///
/// On Linux there is no interactive prompt: access is whatever the device
/// node's permissions allow, so a request answers immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NusbHost;

impl NusbHost {
    fn find(device: &UsbDeviceInfo) -> io::Result<Option<nusb::DeviceInfo>> {
        Ok(nusb::list_devices()?.find(|d| {
            d.bus_number() == device.bus_number && d.device_address() == device.device_address
        }))
    }
}

impl UsbHost for NusbHost {
    fn list_devices(&self) -> PrintResult<Vec<UsbDeviceInfo>> {
        let devices = nusb::list_devices()?;
        Ok(devices.map(|d| UsbDeviceInfo::from_nusb(&d)).collect())
    }

    fn has_permission(&self, device: &UsbDeviceInfo) -> bool {
        match Self::find(device) {
            Ok(Some(info)) => info.open().is_ok(),
            _ => false,
        }
    }

    fn request_permission(&self, device: &UsbDeviceInfo, reply: oneshot::Sender<bool>) {
        let granted = self.has_permission(device);
        debug!(device = %device.device_path(), granted, "USB: permission answered by device node access");
        let _ = reply.send(granted);
    }

    fn watch(&self) -> PrintResult<BoxStream<'static, UsbEvent>> {
        let watch = nusb::watch_devices()?;
        Ok(watch
            .map(|event| match event {
                HotplugEvent::Connected(info) => UsbEvent::Attached(UsbDeviceInfo::from_nusb(&info)),
                HotplugEvent::Disconnected(id) => UsbEvent::Detached(format!("{:?}", id)),
            })
            .boxed())
    }

    fn open(&self, device: &UsbDeviceInfo) -> PrintResult<Box<dyn UsbLink>> {
        let (interface, ep_out) = claim(device)?;
        Ok(Box::new(NusbLink { interface, ep_out }))
    }
}

struct NusbLink {
    interface: nusb::Interface,
    ep_out: u8,
}

impl UsbLink for NusbLink {
    fn write(&mut self, data: Vec<u8>) -> BoxFuture<'_, PrintResult<()>> {
        let transfer = self.interface.bulk_out(self.ep_out, data);
        async move {
            transfer
                .await
                .status
                .map_err(|e| PrintError::WriteFailed(format!("USB bulk OUT: {}", e)))
        }
        .boxed()
    }

    fn close(&mut self) {
        debug!(ep_out = self.ep_out, "USB: releasing interface");
    }
}

/// USB printer connection over a bulk OUT endpoint
pub struct UsbTransport {
    device: UsbDeviceInfo,
    io_timeout: Duration,
    host: Arc<dyn UsbHost>,
    link: Option<Box<dyn UsbLink>>,
}

impl UsbTransport {
    pub fn new(device: UsbDeviceInfo, host: Arc<dyn UsbHost>, config: &PrinterConfig) -> Self {
        Self {
            device,
            io_timeout: config.io_timeout,
            host,
            link: None,
        }
    }

    pub fn device(&self) -> &UsbDeviceInfo {
        &self.device
    }
}

impl Transport for UsbTransport {
    #[instrument(skip(self), fields(device = %self.device.device_path()))]
    async fn open(&mut self) -> PrintResult<()> {
        info!(
            target: "printer",
            "USB: opening {} ({})",
            self.device.usb_device_id(),
            self.device.device_path()
        );

        let host = self.host.clone();
        let device = self.device.clone();
        let link = tokio::task::spawn_blocking(move || host.open(&device))
            .await
            .map_err(|e| PrintError::Io(io::Error::other(e)))??;

        info!(target: "printer", "USB: interface claimed");
        self.link = Some(link);
        Ok(())
    }

    #[instrument(skip(self, data), fields(data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| PrintError::WriteFailed("USB interface not claimed".to_string()))?;

        tokio::time::timeout(self.io_timeout, link.write(data.to_vec()))
            .await
            .map_err(|_| PrintError::WriteFailed(format!("USB bulk OUT timed out after {:?}", self.io_timeout)))??;

        info!(target: "printer", "USB: sent {} bytes", data.len());
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
            info!(target: "printer", "USB: connection closed");
        }
    }
}

/// Re-enumerate, open the device and claim the first interface that has a
/// bulk OUT endpoint, preferring printer-class interfaces.
fn claim(device: &UsbDeviceInfo) -> PrintResult<(nusb::Interface, u8)> {
    let info = NusbHost::find(device)?.ok_or_else(|| {
        PrintError::DeviceNotFound(format!("USB device {} is no longer attached", device.device_path()))
    })?;

    let handle = info.open().map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => {
            PrintError::PermissionDenied(format!("{}: {}", device.device_path(), e))
        }
        _ => PrintError::Io(e),
    })?;

    let (interface_number, ep_out) = find_bulk_out(&handle)?;
    debug!(interface_number, "USB: bulk OUT endpoint 0x{:02X}", ep_out);

    // usblp may hold the interface on Linux
    let interface = handle.detach_and_claim_interface(interface_number).map_err(|e| {
        PrintError::Io(io::Error::other(format!(
            "failed to claim interface {}: {}",
            interface_number, e
        )))
    })?;

    Ok((interface, ep_out))
}

fn find_bulk_out(device: &nusb::Device) -> PrintResult<(u8, u8)> {
    let config = device.active_configuration().map_err(|e| {
        PrintError::Io(io::Error::other(format!("failed to read active configuration: {}", e)))
    })?;

    let mut fallback = None;
    for alt in config.interface_alt_settings() {
        if alt.alternate_setting() != 0 {
            continue;
        }
        let ep_out = alt
            .endpoints()
            .find(|ep| ep.transfer_type() == EndpointType::Bulk && ep.direction() == Direction::Out)
            .map(|ep| ep.address());
        let Some(ep_out) = ep_out else {
            continue;
        };
        if alt.class() == USB_CLASS_PRINTER {
            return Ok((alt.interface_number(), ep_out));
        }
        fallback.get_or_insert((alt.interface_number(), ep_out));
    }

    fallback.ok_or_else(|| {
        PrintError::DeviceNotFound("no bulk OUT endpoint found on device".to_string())
    })
}
