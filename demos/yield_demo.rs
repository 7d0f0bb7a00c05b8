// ABOUTME: Demo of a REQUEST_BLOCK round trip — server yields three values, client records them
// ABOUTME: Self-contained: binds a server on an ephemeral port and drives it with a client in-process

use std::error::Error;
use std::sync::Arc;

use romp::{Client, ClientOptions, Endpoint, RemoteObject, Server, ServerOptions, Value};

/// `each` yields 1, 2, 3 then returns nil — a rendezvous iterator: the
/// server runs to completion on its own worker, firing one YIELD frame
/// per value without waiting on any client acknowledgement.
struct Counter;

impl RemoteObject for Counter {
    fn call(&self, method: &str, _args: Vec<Value>) -> Result<Value, Value> {
        Err(Value::Str(format!("no such method: {method}")))
    }

    fn call_block(
        &self,
        method: &str,
        _args: Vec<Value>,
        yield_value: &mut dyn FnMut(Value),
    ) -> Result<Value, Value> {
        if method == "each" {
            for v in 1..=3 {
                yield_value(Value::Int(v));
            }
            Ok(Value::Nil)
        } else {
            Err(Value::Str(format!("no such method: {method}")))
        }
    }

    fn methods(&self) -> Vec<String> {
        vec!["each".to_string()]
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let endpoint = Endpoint::parse("tcpromp://127.0.0.1:0")?;
    let server = Server::bind(&endpoint, ServerOptions::default()).await?;
    let id = server.registry().register(Arc::new(Counter))?;
    server.registry().bind("counter", id);

    let addr = server.local_addr().expect("tcp endpoint has a local address");
    tokio::spawn(server.run());

    let client_endpoint = Endpoint::parse(&format!("tcpromp://{}:{}", addr.ip(), addr.port()))?;
    let client = Client::connect(&client_endpoint, ClientOptions::default()).await?;
    let counter = client.resolve("counter").await?;

    let mut seen = Vec::new();
    let result = counter.call_block("each", vec![], |v| seen.push(v)).await?;

    println!("yielded: {seen:?}");
    println!("terminating reply: {result:?}");
    Ok(())
}
