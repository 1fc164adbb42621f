//! USB printing through an injected host

mod common;

use common::{FakeBluetooth, FakeUsb, PromptAnswer, usb_device};
use pos_printer::markup::{self, MarkupRenderer, TagRenderer};
use pos_printer::{
    ConnectionParams, PaperProfile, PaperWidth, PrintError, PrintResult, PrinterConfig, PrinterDevice,
    PrinterStatus, ReceiptDocument, ReceiptPrinter, escpos, layout,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn usb_printer(id: &str) -> PrinterDevice {
    PrinterDevice {
        id: "usb_1004".into(),
        display_name: "EPSON TM-T82".into(),
        model_hint: String::new(),
        connection: ConnectionParams::Usb {
            usb_device_id: Some(id.to_string()),
            platform_specific_id: None,
        },
        status: PrinterStatus::Unknown,
        likely_printer: true,
    }
}

fn printer(host: Arc<FakeUsb>) -> ReceiptPrinter {
    ReceiptPrinter::with_hosts(PrinterConfig::default(), host, Arc::new(FakeBluetooth::unavailable()))
}

fn order() -> ReceiptDocument {
    ReceiptDocument::new("SHOP", "Fish <b> Chips x 1 RM 9.00\nTotal: RM 9.00").with_timestamp("2024-05-01 12:00")
}

struct BrokenRenderer;

impl MarkupRenderer for BrokenRenderer {
    fn render(&self, _markup: &str, _paper: &PaperProfile) -> PrintResult<Vec<u8>> {
        Err(PrintError::Encoding("backend unavailable".into()))
    }
}

#[tokio::test]
async fn test_usb_print_writes_rendered_markup() {
    let host = Arc::new(FakeUsb::with_grant(vec![usb_device(1, 4, 0x04B8, 0x0202)]));
    let printer = printer(host.clone());
    let paper = PaperProfile::new(PaperWidth::Mm58);

    printer.print(&usb_printer("04B8:0202"), &order(), &paper).await.unwrap();

    let layout = layout::render(&order(), &paper);
    let expected = TagRenderer.render(&markup::encode(&layout), &paper).unwrap();
    assert_eq!(host.written(), expected);
    assert!(String::from_utf8_lossy(&host.written()).contains("Fish <b> Chips x 1\n"));
    assert_eq!(host.opens(), 1);
    assert_eq!(host.closes(), 1);
    assert_eq!(host.prompts(), 0);
}

#[tokio::test]
async fn test_usb_write_failure_still_closes() {
    let mut host = FakeUsb::with_grant(vec![usb_device(1, 4, 0x04B8, 0x0202)]);
    host.fail_write = true;
    let host = Arc::new(host);
    let printer = printer(host.clone());

    let err = printer
        .print(&usb_printer("04B8:0202"), &order(), &PaperProfile::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "WRITE_FAILED");
    assert_eq!(host.opens(), 1);
    assert_eq!(host.closes(), 1);
    assert!(!printer.print_receipt(&usb_printer("04B8:0202"), &order(), &PaperProfile::default()).await);
    assert_eq!(host.closes(), 2);
}

#[tokio::test]
async fn test_renderer_failure_falls_back_to_raw_stream() {
    let host = Arc::new(FakeUsb::with_grant(vec![usb_device(1, 4, 0x04B8, 0x0202)]));
    let printer = printer(host.clone()).with_renderer(Arc::new(BrokenRenderer));
    let paper = PaperProfile::new(PaperWidth::Mm80);

    printer.print(&usb_printer("04B8:0202"), &order(), &paper).await.unwrap();

    assert_eq!(host.written(), escpos::encode(&layout::render(&order(), &paper)));
    assert_eq!(host.closes(), 1);
}

#[tokio::test]
async fn test_denied_device_is_never_opened() {
    let host = Arc::new(FakeUsb::new(vec![usb_device(1, 4, 0x04B8, 0x0202)], PromptAnswer::Deny));
    let printer = printer(host.clone());

    let err = printer
        .print(&usb_printer("04B8:0202"), &order(), &PaperProfile::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "PERMISSION_DENIED");
    assert_eq!(host.opens(), 0);
    assert_eq!(host.closes(), 0);
}
