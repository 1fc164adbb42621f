//! Print orchestration
//!
//! [`ReceiptPrinter`] is the host-facing service: it discovers devices,
//! gates USB access, renders receipts for the chosen transport and runs every
//! job under a wall-clock budget. A connection lives for exactly one job and
//! is closed on every exit path.

use crate::config::PrinterConfig;
use crate::discovery::{self, find_usb_device};
use crate::error::{PrintError, PrintResult};
use crate::escpos;
use crate::layout::{self, ReceiptLayout};
use crate::markup::{self, MarkupRenderer, TagRenderer};
use crate::model::{ConnectionParams, PaperProfile, PrinterDevice, PrinterStatus, ReceiptDocument};
use crate::permission::{AttachListener, PermissionGate};
use crate::transport::{
    BluetoothHost, BluetoothTransport, BluezHost, Connection, NetworkTransport, NusbHost, Transport,
    UsbDeviceInfo, UsbHost, UsbTransport,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Host-facing printer service
pub struct ReceiptPrinter {
    config: PrinterConfig,
    usb: Arc<dyn UsbHost>,
    bluetooth: Arc<dyn BluetoothHost>,
    renderer: Arc<dyn MarkupRenderer>,
    gate: Arc<PermissionGate>,
    listener: AttachListener,
}

impl ReceiptPrinter {
    /// Service backed by the OS USB stack and BlueZ
    pub fn new(config: PrinterConfig) -> Self {
        Self::with_hosts(config, Arc::new(NusbHost), Arc::new(BluezHost))
    }

    pub fn with_hosts(
        config: PrinterConfig,
        usb: Arc<dyn UsbHost>,
        bluetooth: Arc<dyn BluetoothHost>,
    ) -> Self {
        let gate = Arc::new(PermissionGate::new(usb.clone(), config.usb_permission_timeout));
        Self {
            config,
            usb,
            bluetooth,
            renderer: Arc::new(TagRenderer),
            gate,
            listener: AttachListener::new(),
        }
    }

    /// Replace the markup formatting backend used for USB and Bluetooth
    pub fn with_renderer(mut self, renderer: Arc<dyn MarkupRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &PrinterConfig {
        &self.config
    }

    pub fn permission_gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    // === Lifecycle ===

    /// Host came to the foreground: pre-request permission for attached devices
    pub fn on_foreground(&self) {
        if let Err(e) = self.listener.start(self.gate.clone()) {
            warn!(target: "printer", "USB attach receiver failed to start: {}", e);
        }
    }

    /// Host went to the background
    pub fn on_background(&self) {
        self.listener.stop();
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_running()
    }

    // === Discovery ===

    /// Record for a network printer entered by the user
    pub fn network_device(&self, ip: &str, port: Option<u16>) -> PrinterDevice {
        PrinterDevice::network(ip.trim(), port.unwrap_or(self.config.default_port))
    }

    /// USB devices followed by paired Bluetooth printers
    #[instrument(skip(self))]
    pub async fn discover_printers(&self) -> Vec<PrinterDevice> {
        let usb = self.usb.clone();
        let bluetooth = self.bluetooth.clone();
        match tokio::task::spawn_blocking(move || discovery::discover(usb.as_ref(), bluetooth.as_ref())).await {
            Ok(devices) => {
                info!(target: "printer", "Discovery: {} devices", devices.len());
                devices
            }
            Err(e) => {
                warn!(target: "printer", "Discovery task failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Ask for access to a USB printer ahead of printing
    pub async fn request_usb_permission(&self, params: &ConnectionParams) -> bool {
        if let Err(e) = params.validate() {
            warn!(target: "printer", "USB: permission request rejected: {}", e);
            return false;
        }
        match self.locate_usb(params).await {
            Ok(device) => self.gate.check_or_request(&device).await,
            Err(e) => {
                warn!(target: "printer", "USB: device not found for permission request: {}", e);
                false
            }
        }
    }

    // === Printing ===

    /// Print a receipt, reporting failures as a bool
    pub async fn print_receipt(&self, device: &PrinterDevice, doc: &ReceiptDocument, paper: &PaperProfile) -> bool {
        self.report("printReceipt", self.print(device, doc, paper).await)
    }

    /// Print a kitchen/order ticket. Same rendering as a receipt.
    pub async fn print_order(&self, device: &PrinterDevice, order: &ReceiptDocument, paper: &PaperProfile) -> bool {
        self.report("printOrder", self.print(device, order, paper).await)
    }

    /// Print a fixed test page identifying the device
    pub async fn test_print(&self, device: &PrinterDevice, paper: &PaperProfile) -> bool {
        let doc = test_document(device);
        self.report("testPrint", self.print(device, &doc, paper).await)
    }

    fn report(&self, operation: &str, result: PrintResult<()>) -> bool {
        match result {
            Ok(()) => {
                info!(target: "printer", "{}: result=true", operation);
                true
            }
            Err(e) => {
                warn!(target: "printer", kind = e.kind(), "{} failed: {}", operation, e);
                false
            }
        }
    }

    /// Lay out, encode and deliver one document.
    ///
    /// Network printers get raw ESC/POS; USB and Bluetooth go through the
    /// markup renderer. The transport is closed before this returns.
    #[instrument(skip(self, doc, paper), fields(printer = %device.id, kind = %device.connection_type()))]
    pub async fn print(&self, device: &PrinterDevice, doc: &ReceiptDocument, paper: &PaperProfile) -> PrintResult<()> {
        device.connection.validate()?;
        let layout = layout::render(doc, paper);

        match &device.connection {
            ConnectionParams::Network { ip_address, port } => {
                let payload = escpos::encode(&layout);
                let conn = Connection::Network(NetworkTransport::new(ip_address, *port, &self.config));
                self.deliver(conn, &payload, self.config.network_budget).await?;
                info!(target: "printer", "NETWORK: print successful");
            }
            ConnectionParams::Usb { .. } => {
                let target = self.locate_usb(&device.connection).await?;
                if !self.gate.check_or_request(&target).await {
                    return Err(PrintError::PermissionDenied(format!(
                        "no access to USB device {}",
                        target.device_path()
                    )));
                }
                let payload = self.render_markup(&layout, paper);
                let conn = Connection::Usb(UsbTransport::new(target, self.usb.clone(), &self.config));
                let budget = self.config.connect_timeout + self.config.io_timeout;
                self.deliver(conn, &payload, budget).await?;
                info!(target: "printer", "USB: print successful");
            }
            ConnectionParams::Bluetooth { bluetooth_address } => {
                if !self.bluetooth_available().await {
                    return Err(PrintError::DeviceNotFound("bluetooth adapter unavailable".into()));
                }
                let payload = self.render_markup(&layout, paper);
                let conn = Connection::Bluetooth(BluetoothTransport::new(
                    bluetooth_address,
                    self.bluetooth.clone(),
                    &self.config,
                ));
                let budget = self.config.bluetooth_connect_timeout + self.config.io_timeout;
                self.deliver(conn, &payload, budget).await?;
                info!(target: "printer", "BLUETOOTH: print successful");
            }
        }
        Ok(())
    }

    /// Markup bytes from the renderer, or the raw stream if it cannot render
    fn render_markup(&self, layout: &ReceiptLayout, paper: &PaperProfile) -> Vec<u8> {
        let text = markup::encode(layout);
        match self.renderer.render(&text, paper) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(target: "printer", "Markup rendering failed, sending raw ESC/POS: {}", e);
                escpos::encode(layout)
            }
        }
    }

    /// Open, write, then always close, all under one watchdog
    async fn deliver(&self, mut conn: Connection, payload: &[u8], budget: Duration) -> PrintResult<()> {
        let kind = conn.connection_type();
        let outcome = tokio::time::timeout(budget, async {
            conn.open().await?;
            conn.write(payload).await
        })
        .await;
        conn.close().await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(target: "printer", "{}: job exceeded {:?}, connection closed", kind, budget);
                Err(PrintError::Timeout(format!("{} print exceeded {:?}", kind, budget)))
            }
        }
    }

    // === Status ===

    /// Point-in-time reachability. Never fails; malformed params yield `Error`.
    #[instrument(skip(self), fields(kind = %params.connection_type()))]
    pub async fn check_status(&self, params: &ConnectionParams) -> PrinterStatus {
        if let Err(e) = params.validate() {
            warn!(target: "printer", "Status check rejected: {}", e);
            return PrinterStatus::Error;
        }

        match params {
            ConnectionParams::Network { ip_address, port } => {
                let mut probe = NetworkTransport::new(ip_address, *port, &self.config)
                    .with_connect_timeout(self.config.status_connect_timeout);
                let result = tokio::time::timeout(self.config.status_budget, probe.open()).await;
                probe.close().await;
                match result {
                    Ok(Ok(())) => {
                        info!("Printer online");
                        PrinterStatus::Online
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "Printer offline");
                        PrinterStatus::Offline
                    }
                    Err(_) => {
                        warn!("Printer check timeout");
                        PrinterStatus::Offline
                    }
                }
            }
            // No probe exists that avoids claiming the interface
            ConnectionParams::Usb { .. } => PrinterStatus::Offline,
            ConnectionParams::Bluetooth { bluetooth_address } => {
                let host = self.bluetooth.clone();
                let address = bluetooth_address.clone();
                let bonded = tokio::task::spawn_blocking(move || host.is_available() && host.is_bonded(&address))
                    .await
                    .unwrap_or(false);
                if bonded {
                    PrinterStatus::Online
                } else {
                    PrinterStatus::Offline
                }
            }
        }
    }

    // === Helpers ===

    /// Re-enumerate and resolve USB params to an attached device
    async fn locate_usb(&self, params: &ConnectionParams) -> PrintResult<UsbDeviceInfo> {
        let usb = self.usb.clone();
        let devices = tokio::task::spawn_blocking(move || usb.list_devices())
            .await
            .map_err(|e| PrintError::Io(io::Error::other(e)))??;
        find_usb_device(&devices, params)
    }

    async fn bluetooth_available(&self) -> bool {
        let host = self.bluetooth.clone();
        tokio::task::spawn_blocking(move || host.is_available())
            .await
            .unwrap_or(false)
    }
}

/// Fixed test page content
pub fn test_document(device: &PrinterDevice) -> ReceiptDocument {
    ReceiptDocument::new(
        "TEST PRINT",
        format!(
            "This is a test print from the POS\n\nPrinter ID: {}\nConnection Type: {}\n\nTest completed successfully!",
            device.id,
            device.connection_type()
        ),
    )
    .with_timestamp(chrono::Utc::now().timestamp_millis().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_document() {
        let device = PrinterDevice::network("192.168.1.100", 9100);
        let doc = test_document(&device);
        assert_eq!(doc.title, "TEST PRINT");
        assert!(doc.content.contains("Printer ID: net_192.168.1.100_9100"));
        assert!(doc.content.contains("Connection Type: network"));
        assert!(doc.printable_timestamp().unwrap().parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_params_report_error_status() {
        let printer = ReceiptPrinter::new(PrinterConfig::default());
        let status = printer
            .check_status(&ConnectionParams::Network {
                ip_address: String::new(),
                port: 9100,
            })
            .await;
        assert_eq!(status, PrinterStatus::Error);
    }

    #[tokio::test]
    async fn test_invalid_device_fails_before_connecting() {
        let printer = ReceiptPrinter::new(PrinterConfig::default());
        let device = PrinterDevice::network("  ", 9100);
        let err = printer
            .print(&device, &ReceiptDocument::new("T", "x"), &PaperProfile::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_ARGUMENT");
        assert!(!printer.print_receipt(&device, &ReceiptDocument::new("T", "x"), &PaperProfile::default()).await);
    }
}
