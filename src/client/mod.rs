// ABOUTME: Client-side API — connects, resolves the bootstrap object, and owns the shared session
// ABOUTME: Forbidden-method filtering and the reply state machine live in the sibling proxy module

mod builder;
mod proxy;

pub use builder::ClientBuilder;
pub use proxy::Proxy;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::endpoint::Endpoint;
use crate::error::{RompError, RompResult};
use crate::session::Session;
use crate::transport;

/// Options passed to [`Client::connect`].
#[derive(Clone)]
pub struct ClientOptions {
    /// When `true` (default), a proxy call that finds the session already
    /// busy waits for it. When `false`, it fails immediately with
    /// [`RompError::Protocol`] instead of blocking — the ~20% throughput
    /// win the base design notes for callers who already guarantee a
    /// single in-flight call per client and would rather fail fast than
    /// queue (see DESIGN.md for why this crate translates "unsynchronized"
    /// as fail-fast rather than skipping the lock outright: `Session` is
    /// `&mut`-only state, so there is no sound way to call through it
    /// without *some* form of exclusion).
    pub synchronized: bool,
    /// Ambient extension beyond the base design: an optional per-call
    /// timeout layered over frame reads.
    pub call_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            synchronized: true,
            call_timeout: None,
        }
    }
}

/// Shared per-session state handed to every [`Proxy`] built from the same
/// [`Client`]: the framed session and the call policy serializing callers.
pub(crate) struct SessionHandle {
    pub(crate) session: AsyncMutex<Session>,
    pub(crate) synchronized: bool,
    pub(crate) call_timeout: Option<Duration>,
}

/// A connected client. Holds the session every [`Proxy`] it produces will
/// share, plus the resolver used to look up named objects.
pub struct Client {
    shared: Arc<SessionHandle>,
}

impl Client {
    /// Connects to `endpoint`. The resolver (object id 0) is reachable
    /// immediately via [`Client::resolve`]; no handshake is performed
    /// before the first call, matching the base design's connectionless
    /// framing.
    pub async fn connect(endpoint: &Endpoint, options: ClientOptions) -> RompResult<Self> {
        if !endpoint.is_stream() {
            return Err(RompError::Config(
                "datagram endpoints do not support framed sessions".to_string(),
            ));
        }
        let stream = transport::connect(endpoint).await?;
        let session = Session::new(stream);

        Ok(Client {
            shared: Arc::new(SessionHandle {
                session: AsyncMutex::new(session),
                synchronized: options.synchronized,
                call_timeout: options.call_timeout,
            }),
        })
    }

    /// Asks the well-known resolver object (id 0) to resolve `name`, and
    /// returns a proxy to the resulting object.
    pub async fn resolve(&self, name: &str) -> RompResult<Proxy> {
        let resolver = self.proxy_for(0);
        let id = resolver.call("resolve", vec![name.into()]).await?;
        let id = id
            .as_int()
            .ok_or_else(|| RompError::Protocol("resolver did not return an integer id".to_string()))?;
        Ok(self.proxy_for(id as u16))
    }

    /// Builds a proxy directly from a known object id, bypassing the
    /// resolver. Used by the resolver itself (id 0) and by callers that
    /// already hold an id from a prior [`crate::value::Value::ObjectRef`].
    pub fn proxy_for(&self, object_id: u16) -> Proxy {
        Proxy::new(Arc::clone(&self.shared), object_id)
    }
}
