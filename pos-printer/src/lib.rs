//! # pos-printer
//!
//! Receipt printing for point-of-sale hosts.
//!
//! ## Scope
//!
//! - Discovery of USB devices and paired Bluetooth printers
//! - USB permission gating with per-device request coalescing
//! - One receipt layout for 58mm and 80mm paper
//! - Raw ESC/POS for network printers (TCP port 9100)
//! - Tag markup for USB and Bluetooth printers
//! - Bounded connect/write with guaranteed cleanup
//!
//! ## Example
//!
//! ```ignore
//! use pos_printer::{PaperProfile, PaperWidth, PrinterConfig, ReceiptDocument, ReceiptPrinter};
//!
//! let printer = ReceiptPrinter::new(PrinterConfig::from_env());
//! let device = printer.network_device("192.168.1.100", None);
//! let doc = ReceiptDocument::new("MY SHOP", "Nasi Lemak x 2 RM 12.00\nTotal: RM 12.00");
//!
//! printer.print(&device, &doc, &PaperProfile::new(PaperWidth::Mm80)).await?;
//! ```

pub mod config;
pub mod discovery;
mod error;
pub mod escpos;
pub mod layout;
pub mod logger;
pub mod markup;
mod model;
pub mod permission;
mod printer;
mod text;
pub mod transport;

// Re-exports
pub use config::PrinterConfig;
pub use error::{PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use layout::{Alignment, Emphasis, LayoutLine, ReceiptLayout};
pub use logger::{DiagnosticForwarder, init_logger, init_logger_with_diagnostics};
pub use markup::{MarkupRenderer, TagRenderer};
pub use model::{
    ConnectionParams, ConnectionType, PaperProfile, PaperWidth, PrinterDevice, PrinterStatus,
    ReceiptDocument, is_valid_mac,
};
pub use permission::{AttachListener, PermissionGate, PermissionState};
pub use printer::{ReceiptPrinter, test_document};
pub use text::{pad_left, pad_right, rule, text_width, truncate};
pub use transport::{
    BluetoothHost, BondedDevice, Connection, Transport, UsbDeviceInfo, UsbEvent, UsbHost, UsbLink,
};
