//! The network streams a session runs over

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_native_tls::{TlsConnector, TlsStream};
use log::debug;
use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::error::Error;
use crate::runtime::{io_timeout, timeout, Read, TcpStream, Write};

/// Parameters to use for secure clients
///
/// The connector is shared between clones, every session of a manager reuses it.
#[derive(Clone)]
pub struct ClientTlsParameters {
    /// A connector from `native-tls`
    pub connector: Arc<TlsConnector>,
    /// The domain to send during the TLS handshake
    pub domain: String,
}

impl fmt::Debug for ClientTlsParameters {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ClientTlsParameters")
            .field("connector", &"TlsConnector")
            .field("domain", &self.domain)
            .finish()
    }
}

impl ClientTlsParameters {
    /// Creates a `ClientTlsParameters`
    pub fn new(domain: String, connector: TlsConnector) -> ClientTlsParameters {
        ClientTlsParameters {
            connector: Arc::new(connector),
            domain,
        }
    }

    /// Parameters validating `domain` against the platform trust store
    pub fn with_default_roots(domain: String) -> ClientTlsParameters {
        ClientTlsParameters::new(domain, TlsConnector::new())
    }
}

/// How to apply TLS to a client connection
#[derive(Clone, Debug)]
pub enum ClientSecurity {
    /// Insecure connection only (for testing purposes)
    None,
    /// Use TLS wrapped connection
    Wrapper(ClientTlsParameters),
}

impl ClientSecurity {
    /// Whether the connection is encrypted from the first byte
    pub fn is_encrypted(&self) -> bool {
        matches!(self, ClientSecurity::Wrapper(_))
    }
}

/// Represents the different types of underlying network streams
#[pin_project(project = NetworkStreamProj)]
pub enum NetworkStream {
    /// Plain TCP stream
    Tcp(#[pin] TcpStream),
    /// Encrypted TCP stream
    Tls(#[pin] TlsStream<TcpStream>),
}

impl fmt::Debug for NetworkStream {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            NetworkStream::Tcp(_) => "Tcp",
            NetworkStream::Tls(_) => "Tls",
        };
        fmt.debug_tuple("NetworkStream")
            .field(&kind)
            .field(&self.peer_addr().ok())
            .finish()
    }
}

impl NetworkStream {
    /// Opens a connection to `(host, port)`, wrapping it in TLS when asked to.
    ///
    /// Both the TCP connect and the TLS handshake are bounded by `timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
        security: &ClientSecurity,
    ) -> Result<NetworkStream, Error> {
        let tcp_stream = match connect_timeout {
            Some(duration) => io_timeout(duration, TcpStream::connect((host, port))).await?,
            None => TcpStream::connect((host, port)).await?,
        };

        debug!("connected to {}:{}", host, port);

        match security {
            ClientSecurity::None => Ok(NetworkStream::Tcp(tcp_stream)),
            ClientSecurity::Wrapper(context) => {
                let handshake = context.connector.connect(&context.domain, tcp_stream);
                let tls_stream = match connect_timeout {
                    Some(duration) => timeout(duration, handshake).await??,
                    None => handshake.await?,
                };
                debug!("connection encrypted");
                Ok(NetworkStream::Tls(tls_stream))
            }
        }
    }

    /// Returns peer's address
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match *self {
            NetworkStream::Tcp(ref s) => s.peer_addr(),
            NetworkStream::Tls(ref s) => s.get_ref().peer_addr(),
        }
    }

    /// Is the NetworkStream encrypted
    pub fn is_encrypted(&self) -> bool {
        match *self {
            NetworkStream::Tcp(_) => false,
            NetworkStream::Tls(_) => true,
        }
    }
}

impl Read for NetworkStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_read(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_read(cx, buf),
        }
    }
}

impl Write for NetworkStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_write(cx, buf),
            NetworkStreamProj::Tls(s) => s.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_flush(cx),
            NetworkStreamProj::Tls(s) => s.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            NetworkStreamProj::Tcp(s) => s.poll_shutdown(cx),
            NetworkStreamProj::Tls(s) => s.poll_shutdown(cx),
        }
    }
}
