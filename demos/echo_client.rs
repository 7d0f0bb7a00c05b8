// ABOUTME: Demo client resolving the "echo" object and making a handful of calls against it
// ABOUTME: Pair this with echo_server.rs: run the server first, then point this at the same endpoint

use std::error::Error;

use argh::FromArgs;

use romp::{Client, ClientOptions, Endpoint, Value};

/// Connects to a romp demo server and calls its `"echo"` object.
#[derive(FromArgs)]
struct CliArgs {
    /// endpoint URI to connect to
    #[argh(option, short = 'e', default = "String::from(\"tcpromp://127.0.0.1:9000\")")]
    endpoint: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();
    let endpoint = Endpoint::parse(&cli_args.endpoint)?;
    let client = Client::connect(&endpoint, ClientOptions::default()).await?;

    let echo = client.resolve("echo").await?;

    let reply = echo.call("foo", vec![Value::Int(42)]).await?;
    println!("foo(42) -> {reply:?}");

    echo.oneway("foo", vec![Value::Str("fire and forget".to_string())]).await?;
    echo.sync().await?;
    println!("oneway call acknowledged via sync()");

    match echo.call("no_such_method", vec![]).await {
        Ok(value) => println!("unexpected success: {value:?}"),
        Err(err) => println!("calling an unknown method raised: {err}"),
    }

    Ok(())
}
