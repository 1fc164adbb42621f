//! Printer discovery
//!
//! USB: every attached device is listed, with a "likely printer" label that
//! is advisory only. Bluetooth: only paired devices whose name looks like a
//! printer. Network printers are never scanned for; the host supplies them.

use crate::error::{PrintError, PrintResult};
use crate::model::{ConnectionParams, PrinterDevice, PrinterStatus};
use crate::transport::usb::USB_CLASS_PRINTER;
use crate::transport::{BluetoothHost, BondedDevice, UsbDeviceInfo, UsbHost};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Substrings of a Bluetooth name that mark it as a printer
const BLUETOOTH_PRINTER_KEYWORDS: [&str; 4] = ["printer", "receipt", "thermal", "pos"];

const USB_PRODUCT_KEYWORDS: [&str; 3] = ["printer", "pos", "receipt"];
const USB_MANUFACTURER_KEYWORDS: [&str; 3] = ["epson", "star", "citizen"];

fn contains_any(haystack: Option<&str>, needles: &[&str]) -> bool {
    haystack
        .map(str::to_lowercase)
        .is_some_and(|h| needles.iter().any(|n| h.contains(n)))
}

/// Printer class on the device or its first interface, or a printer-ish
/// product/manufacturer string
pub fn is_likely_usb_printer(device: &UsbDeviceInfo) -> bool {
    device.class == USB_CLASS_PRINTER
        || device.interface_classes.first() == Some(&USB_CLASS_PRINTER)
        || contains_any(device.product.as_deref(), &USB_PRODUCT_KEYWORDS)
        || contains_any(device.manufacturer.as_deref(), &USB_MANUFACTURER_KEYWORDS)
}

/// Case-insensitive keyword match on the advertised name
pub fn is_bluetooth_printer_name(name: Option<&str>) -> bool {
    contains_any(name, &BLUETOOTH_PRINTER_KEYWORDS)
}

pub fn usb_device_record(device: &UsbDeviceInfo) -> PrinterDevice {
    let manufacturer = device.manufacturer.as_deref().unwrap_or("Unknown");
    let product = device.product.as_deref().unwrap_or("USB Printer");
    PrinterDevice {
        id: format!("usb_{}", device.device_id()),
        display_name: format!("{} {}", manufacturer, product),
        model_hint: format!(
            "{} (VID:{:04X} PID:{:04X})",
            device.product.clone().unwrap_or_else(|| device.device_path()),
            device.vendor_id,
            device.product_id
        ),
        connection: ConnectionParams::Usb {
            usb_device_id: Some(device.usb_device_id()),
            platform_specific_id: Some(device.device_path()),
        },
        status: PrinterStatus::Unknown,
        likely_printer: is_likely_usb_printer(device),
    }
}

pub fn bluetooth_device_record(device: &BondedDevice) -> PrinterDevice {
    let name = device
        .name
        .clone()
        .unwrap_or_else(|| "Unknown Bluetooth Printer".to_string());
    PrinterDevice {
        id: format!("bt_{}", device.address.replace(':', "")),
        display_name: name.clone(),
        model_hint: name,
        connection: ConnectionParams::Bluetooth {
            bluetooth_address: device.address.clone(),
        },
        status: PrinterStatus::Unknown,
        likely_printer: true,
    }
}

/// List every attached USB device. Enumeration failure yields no devices.
pub fn discover_usb(host: &dyn UsbHost) -> Vec<PrinterDevice> {
    let devices = match host.list_devices() {
        Ok(devices) => devices,
        Err(e) => {
            warn!(target: "printer", "USB Discovery failed: {}", e);
            return Vec::new();
        }
    };
    info!(target: "printer", "USB Discovery: found {} USB devices", devices.len());

    devices
        .iter()
        .map(|device| {
            let record = usb_device_record(device);
            debug!(
                target: "printer",
                "USB Device: {} VID={:04X} PID={:04X} class={} product={:?} mfg={:?} likely_printer={}",
                device.device_path(),
                device.vendor_id,
                device.product_id,
                device.class,
                device.product,
                device.manufacturer,
                record.likely_printer
            );
            record
        })
        .collect()
}

/// List paired devices whose name looks like a printer. An unavailable
/// adapter or a failed query yields no devices.
pub fn discover_bluetooth(host: &dyn BluetoothHost) -> Vec<PrinterDevice> {
    if !host.is_available() {
        debug!(target: "printer", "BLUETOOTH: adapter unavailable, skipping discovery");
        return Vec::new();
    }
    let bonded = match host.bonded_devices() {
        Ok(bonded) => bonded,
        Err(e) => {
            warn!(target: "printer", "BLUETOOTH Discovery failed: {}", e);
            return Vec::new();
        }
    };

    let printers: Vec<PrinterDevice> = bonded
        .iter()
        .filter(|d| is_bluetooth_printer_name(d.name.as_deref()))
        .map(bluetooth_device_record)
        .collect();
    info!(
        target: "printer",
        "BLUETOOTH Discovery: {} of {} paired devices look like printers",
        printers.len(),
        bonded.len()
    );
    printers
}

/// USB devices first, then Bluetooth. Blocking; run off the async workers.
pub fn discover(usb: &dyn UsbHost, bluetooth: &dyn BluetoothHost) -> Vec<PrinterDevice> {
    let mut devices = discover_usb(usb);
    devices.extend(discover_bluetooth(bluetooth));
    devices
}

/// Interpret one half of a `VID:PID` identifier.
///
/// Accepts hex or decimal with optional `VID`/`PID`/`0x` prefixes. A value
/// containing A-F is hex only; otherwise both readings are candidates.
pub fn parse_usb_id_candidates(raw: &str) -> BTreeSet<u32> {
    let mut candidates = BTreeSet::new();
    let token = raw.trim();
    if token.is_empty() {
        return candidates;
    }

    let cleaned: String = token
        .to_uppercase()
        .replace("VID", "")
        .replace("PID", "")
        .replace("0X", "")
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect();

    if !cleaned.is_empty() {
        if cleaned.chars().any(|c| c.is_ascii_alphabetic()) {
            candidates.extend(u32::from_str_radix(&cleaned, 16).ok());
        } else {
            candidates.extend(cleaned.parse::<u32>().ok());
            candidates.extend(u32::from_str_radix(&cleaned, 16).ok());
        }
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        candidates.extend(token.parse::<u32>().ok());
    }
    candidates
}

/// Match a device against a `VID:PID` identifier or a bare numeric device id
pub fn matches_usb_device(device: &UsbDeviceInfo, identifier: &str) -> bool {
    let id = identifier.trim();
    if let Some((vid, rest)) = id.split_once(':') {
        let pid = rest.split(':').next().unwrap_or(rest);
        return parse_usb_id_candidates(vid).contains(&u32::from(device.vendor_id))
            && parse_usb_id_candidates(pid).contains(&u32::from(device.product_id));
    }
    id.parse::<u32>().is_ok_and(|n| n == device.device_id())
}

/// Find the attached device addressed by USB connection params.
///
/// Each device is tested against the stable identifier first, then the
/// platform path (exact match). The first device matching either wins.
pub fn find_usb_device(devices: &[UsbDeviceInfo], params: &ConnectionParams) -> PrintResult<UsbDeviceInfo> {
    let ConnectionParams::Usb {
        usb_device_id,
        platform_specific_id,
    } = params
    else {
        return Err(PrintError::InvalidArgument("not a USB connection".into()));
    };

    let stable = usb_device_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let path = platform_specific_id.as_deref().map(str::trim).filter(|s| !s.is_empty());

    devices
        .iter()
        .find(|d| {
            stable.is_some_and(|id| matches_usb_device(d, id)) || path.is_some_and(|p| d.device_path() == p)
        })
        .cloned()
        .ok_or_else(|| {
            PrintError::DeviceNotFound(format!(
                "no USB device matches usbDeviceId={:?} platformSpecificId={:?}",
                stable, path
            ))
        })
}
