// ABOUTME: Fluent construction for Client, parsing an endpoint URI and applying ClientOptions
// ABOUTME: A handful of chained with_*-style setters ending in connect()

use std::time::Duration;

use crate::client::{Client, ClientOptions};
use crate::endpoint::Endpoint;
use crate::error::RompResult;

/// Builds a [`Client`] from an endpoint URI plus optional overrides.
///
/// ```no_run
/// # use romp::client::ClientBuilder;
/// # async fn example() -> Result<(), romp::error::RompError> {
/// let client = ClientBuilder::new("tcpromp://localhost:9000")
///     .unsynchronized()
///     .connect()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    uri: String,
    options: ClientOptions,
}

impl ClientBuilder {
    pub fn new(uri: impl Into<String>) -> Self {
        ClientBuilder {
            uri: uri.into(),
            options: ClientOptions::default(),
        }
    }

    /// Opts out of the default per-call session lock. Only sound when the
    /// application guarantees a single in-flight call at a time.
    pub fn unsynchronized(mut self) -> Self {
        self.options.synchronized = false;
        self
    }

    /// Layers a `tokio::time::timeout` over every `Proxy` call.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.options.call_timeout = Some(timeout);
        self
    }

    /// Parses the endpoint and connects.
    pub async fn connect(self) -> RompResult<Client> {
        let endpoint = Endpoint::parse(&self.uri)?;
        Client::connect(&endpoint, self.options).await
    }
}
