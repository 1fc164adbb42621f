//! Logging setup
//!
//! All printer-path events carry the `printer` target and a transport prefix
//! (`NETWORK:`, `USB:`, `BLUETOOTH:`) in the message. A
//! [`DiagnosticForwarder`] can relay those messages to the host UI.

use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Target of every event worth showing to the host
pub const DIAGNOSTIC_TARGET: &str = "printer";

/// Layer that forwards the message of each `printer` event to a channel
pub struct DiagnosticForwarder {
    tx: mpsc::UnboundedSender<String>,
}

impl DiagnosticForwarder {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Forwarder plus the receiving end for the host
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticForwarder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != DIAGNOSTIC_TARGET {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        if let Some(message) = visitor.message {
            // Host went away; nothing to do
            let _ = self.tx.send(message);
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}

/// Initialize the logging system
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug"), overridden by `RUST_LOG`
/// * `json_format` - JSON lines instead of human-readable output
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_diagnostics(level, json_format, None)
}

/// Like [`init_logger`], additionally forwarding `printer` events to `diagnostics`
pub fn init_logger_with_diagnostics(
    level: &str,
    json_format: bool,
    diagnostics: Option<mpsc::UnboundedSender<String>>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(diagnostics.map(DiagnosticForwarder::new))
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    #[test]
    fn test_forwarder_only_relays_printer_target() {
        let (forwarder, mut rx) = DiagnosticForwarder::channel();
        let subscriber = Registry::default().with(forwarder);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "printer", "USB: sent {} bytes", 42);
            tracing::info!(target: "other", "ignored");
            tracing::warn!(target: "printer", code = 7, "NETWORK: socket closed");
        });

        assert_eq!(rx.try_recv().unwrap(), "USB: sent 42 bytes");
        assert_eq!(rx.try_recv().unwrap(), "NETWORK: socket closed");
        assert!(rx.try_recv().is_err());
    }
}
