// ABOUTME: Turns a parsed Endpoint into a listening Acceptor or a connected Stream
// ABOUTME: Sets Nagle-disable and other low-latency socket options on every accepted/connected peer

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::endpoint::Endpoint;
use crate::error::RompError;

/// A listening socket, ready to [`Acceptor::accept`] peers.
pub enum Acceptor {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// A connected, bidirectional byte stream — the transport-layer half of
/// the protocol, below framing.
pub enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

/// Builds a listening [`Acceptor`] for `endpoint`. An empty TCP host binds
/// all interfaces.
pub async fn listen(endpoint: &Endpoint) -> Result<Acceptor, RompError> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let addr = bind_addr(host.as_deref(), *port);
            let listener = TcpListener::bind(addr).await?;
            Ok(Acceptor::Tcp(listener))
        }
        #[cfg(unix)]
        Endpoint::Unix { path } => {
            let listener = UnixListener::bind(path)?;
            Ok(Acceptor::Unix(listener))
        }
        #[cfg(not(unix))]
        Endpoint::Unix { .. } => Err(RompError::Config(
            "unix domain sockets are not supported on this platform".to_string(),
        )),
        Endpoint::Datagram { .. } => Err(RompError::Config(
            "datagram endpoints cannot be listened on as a framed transport".to_string(),
        )),
    }
}

/// Connects to `endpoint` and returns the resulting [`Stream`]. An empty
/// TCP host is a configuration error client-side — it only means something
/// to a listener ("bind all interfaces").
pub async fn connect(endpoint: &Endpoint) -> Result<Stream, RompError> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let host = host
                .as_deref()
                .ok_or_else(|| RompError::Config("empty host is not valid for a client connection".to_string()))?;
            let stream = TcpStream::connect((host, *port)).await?;
            stream.set_nodelay(true)?;
            Ok(Stream::Tcp(stream))
        }
        #[cfg(unix)]
        Endpoint::Unix { path } => {
            let stream = UnixStream::connect(path).await?;
            Ok(Stream::Unix(stream))
        }
        #[cfg(not(unix))]
        Endpoint::Unix { .. } => Err(RompError::Config(
            "unix domain sockets are not supported on this platform".to_string(),
        )),
        Endpoint::Datagram { .. } => Err(RompError::Config(
            "datagram endpoints cannot be connected to as a framed transport".to_string(),
        )),
    }
}

fn bind_addr(host: Option<&str>, port: u16) -> SocketAddr {
    let host = host.unwrap_or("0.0.0.0");
    format!("{host}:{port}")
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)))
}

impl Acceptor {
    /// Accepts one peer, disabling Nagle on TCP (low-latency small
    /// messages). Returns the stream plus a human-readable peer address,
    /// when the transport has one to offer.
    pub async fn accept(&self) -> Result<(Stream, Option<String>), RompError> {
        match self {
            Acceptor::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Stream::Tcp(stream), Some(peer.to_string())))
            }
            #[cfg(unix)]
            Acceptor::Unix(listener) => {
                let (stream, _peer) = listener.accept().await?;
                Ok((Stream::Unix(stream), None))
            }
        }
    }

    pub fn local_addr_display(&self) -> String {
        match self {
            Acceptor::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "<unknown>".to_string()),
            #[cfg(unix)]
            Acceptor::Unix(_) => "<unix socket>".to_string(),
        }
    }

    /// The bound TCP address, including the OS-assigned port when the
    /// endpoint requested port `0` — tests bind an ephemeral port this way
    /// and need the real number back before they can connect a client.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Acceptor::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Acceptor::Unix(_) => None,
        }
    }
}

impl Stream {
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), RompError> {
        match self {
            Stream::Tcp(s) => s.read_exact(buf).await.map(|_| ()).map_err(RompError::from),
            #[cfg(unix)]
            Stream::Unix(s) => s.read_exact(buf).await.map(|_| ()).map_err(RompError::from),
        }
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), RompError> {
        match self {
            Stream::Tcp(s) => s.write_all(buf).await.map_err(RompError::from),
            #[cfg(unix)]
            Stream::Unix(s) => s.write_all(buf).await.map_err(RompError::from),
        }
    }

    /// Attempts a non-blocking read. A spurious `WouldBlock` (readiness can
    /// over-report under level-triggered polling) is surfaced as-is so the
    /// caller retries via [`Stream::readable`] instead of mistaking it for
    /// `Ok(0)` — a real zero-length read means the peer disconnected.
    pub fn try_read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.try_read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.try_read(buf),
        }
    }

    pub fn try_write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.try_write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.try_write(buf),
        }
    }

    pub async fn readable(&self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.readable().await,
            #[cfg(unix)]
            Stream::Unix(s) => s.readable().await,
        }
    }

    pub async fn writable(&self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(s) => s.writable().await,
            #[cfg(unix)]
            Stream::Unix(s) => s.writable().await,
        }
    }
}
