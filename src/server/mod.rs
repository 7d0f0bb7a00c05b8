// ABOUTME: Server construction — binds an endpoint, accepts peers, spawns one dispatch task each
// ABOUTME: Re-exports the dispatch loop and the connection predicate / debug options

mod dispatch;

pub use dispatch::run_session;

use std::sync::Arc;

use tracing::{info, warn};

use crate::endpoint::Endpoint;
use crate::error::RompError;
use crate::registry::Registry;
use crate::transport::{self, Acceptor};

/// Information handed to the connection predicate so it can decide whether
/// to accept a peer. Kept deliberately small — authentication and transport
/// encryption are out of scope here; this is just enough for an
/// operator-level allow/deny decision (e.g. by source address).
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub remote_addr: Option<String>,
}

/// Options passed to [`Server::bind`].
#[derive(Clone, Default)]
pub struct ServerOptions {
    /// If set and it returns `false` for an accepted peer, the session is
    /// closed immediately without reading a single frame.
    pub predicate: Option<Arc<dyn Fn(&PeerInfo) -> bool + Send + Sync>>,
    /// When true, one-way call errors are logged locally instead of being
    /// silently discarded.
    pub debug: bool,
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("predicate", &self.predicate.is_some())
            .field("debug", &self.debug)
            .finish()
    }
}

/// The RPC server: one acceptor plus one dispatch task per live connection,
/// all sharing a single [`Registry`].
pub struct Server {
    registry: Arc<Registry>,
    acceptor: Acceptor,
    options: ServerOptions,
}

impl Server {
    /// Binds `endpoint` and constructs a fresh [`Registry`] (with the
    /// resolver pre-registered at id 0).
    pub async fn bind(endpoint: &Endpoint, options: ServerOptions) -> Result<Self, RompError> {
        if !endpoint.is_stream() {
            return Err(RompError::Config(
                "datagram endpoints do not support framed sessions (known-weak, best-effort transport only)"
                    .to_string(),
            ));
        }
        let acceptor = transport::listen(endpoint).await?;
        info!(local_addr = %acceptor.local_addr_display(), "romp server listening");
        Ok(Server {
            registry: Registry::new(),
            acceptor,
            options,
        })
    }

    /// The object registry backing this server. Application code holds
    /// onto this (or a clone of the `Arc`) to register and bind objects
    /// before or while `run` is driving the accept loop.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The bound TCP address, including the OS-assigned port when the
    /// server was bound to port `0`. `None` for Unix domain listeners.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.acceptor.local_addr()
    }

    /// Runs the accept loop forever, spawning one dispatch task per
    /// accepted connection. Returns only on a fatal accept-level error.
    pub async fn run(self) -> Result<(), RompError> {
        let Server {
            registry,
            acceptor,
            options,
        } = self;

        loop {
            let (stream, remote_addr) = acceptor.accept().await?;

            let peer = PeerInfo { remote_addr };
            if let Some(predicate) = &options.predicate {
                if !predicate(&peer) {
                    warn!("connection predicate rejected peer, closing immediately");
                    continue;
                }
            }

            let registry = Arc::clone(&registry);
            let debug = options.debug;
            tokio::spawn(async move {
                if let Err(err) = run_session(stream, registry, debug).await {
                    warn!(error = %err, "session ended with an error");
                }
            });
        }
    }
}
