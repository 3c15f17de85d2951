//! Transports for sending ESC/POS data
//!
//! Supports:
//! - Async sockets (tokio `TcpStream`), the default
//! - Native blocking sockets with kernel read/write timeouts, driven on the
//!   blocking thread pool
//!
//! The backend is chosen once at startup with [`TransportKind::select`].

use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::error::{PrintError, PrintResult};

/// Raw printing port (JetDirect)
pub const DEFAULT_PORT: u16 = 9100;

/// Build a socket address from a host (IP literal) and port
pub fn socket_addr(host: &str, port: u16) -> PrintResult<SocketAddr> {
    let addr_str = if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };
    addr_str
        .parse()
        .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr_str)))
}

/// One open byte stream to a printer
#[async_trait]
pub trait PrinterLink: Send + fmt::Debug {
    fn peer(&self) -> SocketAddr;

    /// Write the whole buffer and flush
    async fn write_all(&mut self, data: &[u8]) -> PrintResult<()>;

    /// Read what the printer sent within `timeout`.
    ///
    /// `Ok(None)` means the window elapsed silently; `Ok(Some(0))` means the
    /// peer closed the connection.
    async fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration)
    -> PrintResult<Option<usize>>;

    async fn shutdown(&mut self);
}

/// Connection factory
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn kind(&self) -> TransportKind;

    async fn connect(&self, addr: SocketAddr, timeout: Duration)
    -> PrintResult<Box<dyn PrinterLink>>;
}

/// Transport backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransportKind {
    #[default]
    Auto,
    Socket,
    Native,
}

impl TransportKind {
    /// Resolve `Auto` and build the backend.
    ///
    /// `Auto` uses async sockets when a tokio runtime is running, native
    /// sockets otherwise.
    pub fn select(self) -> Arc<dyn Transport> {
        let resolved = match self {
            TransportKind::Auto => {
                if tokio::runtime::Handle::try_current().is_ok() {
                    TransportKind::Socket
                } else {
                    TransportKind::Native
                }
            }
            other => other,
        };
        debug!(requested = %self, selected = %resolved, "Transport selected");
        match resolved {
            TransportKind::Native => Arc::new(NativeTransport::default()),
            _ => Arc::new(SocketTransport),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Auto => "auto",
            TransportKind::Socket => "socket",
            TransportKind::Native => "native",
        })
    }
}

impl FromStr for TransportKind {
    type Err = PrintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(TransportKind::Auto),
            "socket" | "tokio" => Ok(TransportKind::Socket),
            "native" | "blocking" => Ok(TransportKind::Native),
            other => Err(PrintError::InvalidConfig(format!(
                "Unknown transport: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Async socket transport
// ============================================================================

/// Async TCP transport (port 9100 raw printing)
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketTransport;

#[async_trait]
impl Transport for SocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    #[instrument(skip(self), fields(addr = %addr))]
    async fn connect(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> PrintResult<Box<dyn PrinterLink>> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", addr, e)))?;
        let _ = stream.set_nodelay(true);
        debug!("Connected");
        Ok(Box::new(SocketLink { addr, stream }))
    }
}

#[derive(Debug)]
struct SocketLink {
    addr: SocketAddr,
    stream: TcpStream,
}

#[async_trait]
impl PrinterLink for SocketLink {
    fn peer(&self) -> SocketAddr {
        self.addr
    }

    async fn write_all(&mut self, data: &[u8]) -> PrintResult<()> {
        self.stream.write_all(data).await.map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> PrintResult<Option<usize>> {
        match tokio::time::timeout(timeout, self.stream.read(buf)).await {
            Ok(Ok(n)) => Ok(Some(n)),
            Ok(Err(e)) => Err(PrintError::Io(e)),
            Err(_) => Ok(None),
        }
    }

    async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}

// ============================================================================
// Native blocking transport
// ============================================================================

/// Blocking `std::net` transport using OS-level socket timeouts
#[derive(Debug, Clone, Copy)]
pub struct NativeTransport {
    write_timeout: Duration,
}

impl NativeTransport {
    pub fn with_write_timeout(write_timeout: Duration) -> Self {
        Self { write_timeout }
    }
}

impl Default for NativeTransport {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl Transport for NativeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Native
    }

    #[instrument(skip(self), fields(addr = %addr))]
    async fn connect(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> PrintResult<Box<dyn PrinterLink>> {
        let write_timeout = self.write_timeout;
        let stream = tokio::task::spawn_blocking(move || {
            let stream = std::net::TcpStream::connect_timeout(&addr, timeout)?;
            stream.set_nodelay(true)?;
            stream.set_write_timeout(Some(write_timeout))?;
            Ok::<_, std::io::Error>(stream)
        })
        .await
        .map_err(|e| PrintError::Connection(format!("Task join failed: {}", e)))?
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => {
                PrintError::Timeout(format!("Connection timeout: {}", addr))
            }
            _ => PrintError::Connection(format!("{}: {}", addr, e)),
        })?;
        debug!("Connected (native)");
        Ok(Box::new(NativeLink {
            addr,
            stream: Some(stream),
        }))
    }
}

#[derive(Debug)]
struct NativeLink {
    addr: SocketAddr,
    /// Moved into the blocking pool for each operation
    stream: Option<std::net::TcpStream>,
}

impl NativeLink {
    async fn run<T, F>(&mut self, op: F) -> PrintResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut std::net::TcpStream) -> std::io::Result<T> + Send + 'static,
    {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| PrintError::Closed(self.addr.to_string()))?;
        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|e| PrintError::Connection(format!("Task join failed: {}", e)))?;
        self.stream = Some(stream);
        result.map_err(PrintError::Io)
    }
}

#[async_trait]
impl PrinterLink for NativeLink {
    fn peer(&self) -> SocketAddr {
        self.addr
    }

    async fn write_all(&mut self, data: &[u8]) -> PrintResult<()> {
        let data = data.to_vec();
        self.run(move |s| {
            s.write_all(&data)?;
            s.flush()
        })
        .await
    }

    async fn read_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> PrintResult<Option<usize>> {
        let len = buf.len();
        let result = self
            .run(move |s| {
                s.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
                let mut tmp = vec![0u8; len];
                match s.read(&mut tmp) {
                    Ok(n) => {
                        tmp.truncate(n);
                        Ok(Some(tmp))
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                        ) =>
                    {
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;
        Ok(result.map(|bytes| {
            buf[..bytes.len()].copy_from_slice(&bytes);
            bytes.len()
        }))
    }

    async fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_socket_addr() {
        let addr = socket_addr("192.168.1.100", 9100).unwrap();
        assert_eq!(addr.port(), 9100);
        assert!(socket_addr("invalid", 9100).is_err());
        assert!(socket_addr("::1", 9100).is_ok());
    }

    #[test]
    fn test_transport_kind_from_str() {
        assert_eq!("Native".parse::<TransportKind>().unwrap(), TransportKind::Native);
        assert_eq!("".parse::<TransportKind>().unwrap(), TransportKind::Auto);
        assert!("bluetooth".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_auto_without_runtime_is_native() {
        assert_eq!(TransportKind::Auto.select().kind(), TransportKind::Native);
    }

    #[tokio::test]
    async fn test_auto_inside_runtime_is_socket() {
        assert_eq!(TransportKind::Auto.select().kind(), TransportKind::Socket);
    }

    async fn roundtrip(transport: Arc<dyn Transport>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 3];
            sock.read_exact(&mut buf).await.unwrap();
            sock.write_all(&[0x12]).await.unwrap();
            buf
        });

        let mut link = transport
            .connect(addr, Duration::from_secs(2))
            .await
            .unwrap();
        link.write_all(&[0x10, 0x04, 0x01]).await.unwrap();
        let mut reply = [0u8; 8];
        let n = link
            .read_timeout(&mut reply, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(n, Some(1));
        assert_eq!(reply[0], 0x12);
        assert_eq!(server.await.unwrap(), [0x10, 0x04, 0x01]);

        // silent peer: the window elapses without data
        let n = link
            .read_timeout(&mut reply, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(matches!(n, None | Some(0)));
        link.shutdown().await;
    }

    #[tokio::test]
    async fn test_socket_roundtrip() {
        roundtrip(Arc::new(SocketTransport)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_native_roundtrip() {
        roundtrip(Arc::new(NativeTransport::default())).await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = SocketTransport
            .connect(addr, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PrintError::Connection(_) | PrintError::Timeout(_)));
    }
}
