//! Receipt Example - discover printers and print a sample receipt
//!
//! Environment (a `.env` file is read if present):
//! - `PRINTER_IP`: network printer to print to (skips discovery)
//! - `PRINTER_PORT`: network port, default 9100
//! - `PAPER_SIZE`: `mm58` or `mm80`
//! - `PRINTER_*_MS`: timeout overrides, see `PrinterConfig::from_env`
//!
//! Run: cargo run -p pos-printer --example receipt

use pos_printer::{PaperProfile, PrinterConfig, ReceiptDocument, ReceiptPrinter, init_logger_with_diagnostics};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let (diag_tx, mut diag_rx) = mpsc::unbounded_channel();
    init_logger_with_diagnostics("info", false, Some(diag_tx))?;
    tokio::spawn(async move {
        while let Some(line) = diag_rx.recv().await {
            println!("[diag] {}", line);
        }
    });

    println!("=== Receipt Example ===\n");

    let printer = ReceiptPrinter::new(PrinterConfig::from_env());
    printer.on_foreground();

    let paper = PaperProfile::from_paper_size(std::env::var("PAPER_SIZE").ok().as_deref());

    let device = match std::env::var("PRINTER_IP") {
        Ok(ip) => {
            let port = std::env::var("PRINTER_PORT").ok().and_then(|p| p.parse().ok());
            printer.network_device(&ip, port)
        }
        Err(_) => {
            println!("1. Discovering printers...");
            let devices = printer.discover_printers().await;
            for d in &devices {
                println!(
                    "   {} [{}] {} likely_printer={}",
                    d.id,
                    d.connection_type(),
                    d.display_name,
                    d.likely_printer
                );
            }
            let Some(device) = devices.into_iter().find(|d| d.likely_printer) else {
                println!("   No printer found. Set PRINTER_IP to print over the network.");
                printer.on_background();
                return Ok(());
            };
            device
        }
    };

    println!("\n2. Checking {}...", device.display_name);
    let status = printer.check_status(&device.connection).await;
    println!("   status: {:?}", status);

    println!("\n3. Printing...");
    let doc = ReceiptDocument::new(
        "EXTROPOS CAFE",
        "Table 5\n\
         \n\
         Nasi Lemak x 2 RM 12.00\n\
         Teh Tarik x 2 RM 6.00\n\
         \n\
         Subtotal: RM 18.00\n\
         Service Charge: RM 1.80\n\
         Total: RM 19.80\n\
         Paid: RM 20.00\n\
         Change: RM 0.20",
    )
    .with_timestamp(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string());

    match printer.print(&device, &doc, &paper).await {
        Ok(()) => println!("   done"),
        Err(e) => println!("   failed ({}): {}", e.kind(), e),
    }

    printer.on_background();
    Ok(())
}
