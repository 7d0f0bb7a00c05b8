// ABOUTME: Demo server exposing one object, "echo", at a well-known name
// ABOUTME: CLI flags via argh, structured logging via tracing-subscriber

use std::error::Error;
use std::sync::Arc;

use argh::FromArgs;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use romp::{Endpoint, RemoteObject, Server, ServerOptions, Value};

/// Runs a romp demo server exposing an `"echo"` object.
#[derive(FromArgs)]
struct CliArgs {
    /// endpoint URI to listen on
    #[argh(option, short = 'e', default = "String::from(\"tcpromp://127.0.0.1:9000\")")]
    endpoint: String,

    /// log raised application errors from one-way calls
    #[argh(switch, short = 'd')]
    debug: bool,
}

/// `foo(x)` echoes `x`; `each` yields 1, 2, 3.
struct Echo;

impl RemoteObject for Echo {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
        match method {
            "foo" => Ok(args.into_iter().next().unwrap_or(Value::Nil)),
            other => Err(Value::Str(format!("no such method: {other}"))),
        }
    }

    fn call_block(
        &self,
        method: &str,
        args: Vec<Value>,
        yield_value: &mut dyn FnMut(Value),
    ) -> Result<Value, Value> {
        if method == "each" {
            for v in 1..=3 {
                yield_value(Value::Int(v));
            }
            Ok(Value::Nil)
        } else {
            self.call(method, args)
        }
    }

    fn methods(&self) -> Vec<String> {
        vec!["foo".to_string(), "each".to_string()]
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let endpoint = Endpoint::parse(&cli_args.endpoint)?;
    let options = ServerOptions {
        debug: cli_args.debug,
        ..Default::default()
    };
    let server = Server::bind(&endpoint, options).await?;

    let id = server.registry().register(Arc::new(Echo))?;
    server.registry().bind("echo", id);

    println!("romp echo server listening on {}", cli_args.endpoint);
    server.run().await?;
    Ok(())
}
