//! Raw TCP transport (JetDirect / port 9100)

use super::Transport;
use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult};
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

/// Network printer connection
///
/// Most thermal printers accept raw ESC/POS on TCP port 9100.
#[derive(Debug)]
pub struct NetworkTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    io_timeout: Duration,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    pub fn new(host: &str, port: u16, config: &PrinterConfig) -> Self {
        Self {
            host: host.trim().to_string(),
            port,
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
            stream: None,
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port` of the printer
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Transport for NetworkTransport {
    #[instrument(skip(self), fields(addr = %self.addr()))]
    async fn open(&mut self) -> PrintResult<()> {
        info!(target: "printer", "NETWORK: connecting to {}", self.addr());

        let connect = TcpStream::connect((self.host.as_str(), self.port));
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                PrintError::ConnectTimeout(format!("{} after {:?}", self.addr(), self.connect_timeout))
            })?
            .map_err(|e| match e.kind() {
                io::ErrorKind::TimedOut => PrintError::ConnectTimeout(format!("{}: {}", self.addr(), e)),
                _ => PrintError::DeviceNotFound(format!("{}: {}", self.addr(), e)),
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        info!("Connected");
        self.stream = Some(stream);
        Ok(())
    }

    #[instrument(skip(self, data), fields(addr = %self.addr(), data_len = data.len()))]
    async fn write(&mut self, data: &[u8]) -> PrintResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PrintError::WriteFailed("connection not open".to_string()))?;

        let send = async {
            stream.write_all(data).await?;
            stream.flush().await
        };
        tokio::time::timeout(self.io_timeout, send)
            .await
            .map_err(|_| PrintError::WriteFailed(format!("write timed out after {:?}", self.io_timeout)))?
            .map_err(|e| PrintError::WriteFailed(e.to_string()))?;

        info!("Sent {} bytes", data.len());
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                warn!(error = %e, "NETWORK close error");
            }
            info!(target: "printer", "NETWORK: socket closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[test]
    fn test_network_transport_new() {
        let t = NetworkTransport::new(" 192.168.1.100 ", 9100, &PrinterConfig::default());
        assert_eq!(t.addr(), "192.168.1.100:9100");
        assert!(!t.is_open());
    }

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let mut t = NetworkTransport::new("127.0.0.1", 9, &PrinterConfig::default());
        let err = t.write(b"x").await.unwrap_err();
        assert_eq!(err.kind(), "WRITE_FAILED");
        // close on a never-opened transport is a no-op
        t.close().await;
        t.close().await;
    }

    #[tokio::test]
    async fn test_open_write_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut t = NetworkTransport::new("127.0.0.1", port, &PrinterConfig::default());
        t.open().await.unwrap();
        assert!(t.is_open());
        t.write(b"\x1B\x40hello").await.unwrap();
        t.close().await;
        assert!(!t.is_open());

        assert_eq!(server.await.unwrap(), b"\x1B\x40hello");
    }

    #[tokio::test]
    async fn test_peer_drop_during_write() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = [0u8; 1024];
            socket.read_exact(&mut head).await.unwrap();
            // dropping with unread data resets the connection
        });

        let mut t = NetworkTransport::new("127.0.0.1", port, &PrinterConfig::default());
        t.open().await.unwrap();
        let err = t.write(&vec![b'A'; 64 * 1024 * 1024]).await.unwrap_err();
        assert_eq!(err.kind(), "WRITE_FAILED");

        server.await.unwrap();
        t.close().await;
        assert!(!t.is_open());
    }
}
