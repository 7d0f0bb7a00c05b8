// ABOUTME: Crate root — wires the six romp components together and re-exports the public API
// ABOUTME: See SPEC_FULL.md / DESIGN.md for the component breakdown and grounding ledger

pub mod client;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
pub mod value;

pub use client::{Client, ClientBuilder, ClientOptions, Proxy};
pub use codec::{FrameHeader, MessageType, CodecError, MAGIC};
pub use endpoint::Endpoint;
pub use error::{RompError, RompResult};
pub use registry::{ObjectId, Registry, RegistryError, RemoteObject};
pub use server::{PeerInfo, Server, ServerOptions};
pub use value::{ExceptionValue, Value};

/// A small distributed-object RPC runtime: proxies, framed sessions, and an
/// object registry.
///
/// A client holds a lightweight [`Proxy`] to an object that physically
/// lives in a remote [`Server`] process and invokes methods on it as if it
/// were local. Arguments, return values, thrown errors, and iterator
/// yields are carried across the connection by a compact binary framing
/// protocol layered over TCP or a Unix domain socket.
///
/// # Examples
///
/// A minimal server exposing one object at a well-known name, and a client
/// resolving and calling it:
///
/// ```rust,no_run
/// use romp::{Endpoint, RemoteObject, Server, ServerOptions, Value};
/// use romp::{Client, ClientOptions};
/// use std::sync::Arc;
///
/// struct Greeter;
///
/// impl RemoteObject for Greeter {
///     fn call(&self, method: &str, mut args: Vec<Value>) -> Result<Value, Value> {
///         match method {
///             "greet" => Ok(Value::Str(format!("hello, {:?}", args.pop()))),
///             other => Err(Value::Str(format!("no such method: {other}"))),
///         }
///     }
///     fn methods(&self) -> Vec<String> {
///         vec!["greet".to_string()]
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let endpoint = Endpoint::parse("tcpromp://127.0.0.1:9999")?;
///     let server = Server::bind(&endpoint, ServerOptions::default()).await?;
///     let id = server.registry().register(Arc::new(Greeter))?;
///     server.registry().bind("greeter", id);
///     tokio::spawn(server.run());
///
///     let client = Client::connect(&endpoint, ClientOptions::default()).await?;
///     let greeter = client.resolve("greeter").await?;
///     let reply = greeter.call("greet", vec!["world".into()]).await?;
///     println!("{reply:?}");
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientOptions, Endpoint, ExceptionValue, PeerInfo, Proxy,
        RemoteObject, RompError, RompResult, Server, ServerOptions, Value,
    };
}
