// ABOUTME: End-to-end coverage of the full call/oneway/yield/exception/reference protocol
// ABOUTME: Binds a real Server on an ephemeral tcpromp:// port and drives it with a real Client

use std::sync::{Arc, Mutex};

use romp::registry::ObjectId;
use romp::{Client, ClientOptions, Endpoint, ExceptionValue, RemoteObject, RompError, Server, ServerOptions, Value};

/// The example object shared by most of the tests below: `foo(x)` both
/// stores and echoes `x`, `i()` returns the last stored value, `each`
/// yields 1, 2, 3, `throw_exception` raises through one level of
/// indirection, and `bar` mints a fresh remote object.
struct Foo {
    i: Mutex<i64>,
    registry: Arc<romp::Registry>,
}

impl Foo {
    fn new(registry: Arc<romp::Registry>) -> Self {
        Foo {
            i: Mutex::new(0),
            registry,
        }
    }

    fn throw_exception(&self) -> Result<Value, Value> {
        self.throw_exception2()
    }

    fn throw_exception2(&self) -> Result<Value, Value> {
        Err(Value::Exception(
            ExceptionValue::new("RuntimeError", "boom")
                .with_backtrace(vec!["Foo#throw_exception2".to_string(), "Foo#throw_exception".to_string()]),
        ))
    }
}

impl RemoteObject for Foo {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
        match method {
            "foo" => {
                let value = args.into_iter().next().unwrap_or(Value::Nil);
                if let Some(n) = value.as_int() {
                    *self.i.lock().unwrap() = n;
                }
                Ok(value)
            }
            "i" => Ok(Value::Int(*self.i.lock().unwrap())),
            "throw_exception" => self.throw_exception(),
            "bar" => {
                let next = *self.i.lock().unwrap() + 1;
                let bar = Arc::new(Bar::new(next, Arc::clone(&self.registry)));
                let reference = self
                    .registry
                    .create_reference(Arc::clone(&bar))
                    .map_err(|e| Value::Str(e.to_string()))?;
                if let Value::ObjectRef(id) = reference {
                    bar.set_id(id);
                }
                Ok(reference)
            }
            "methods" => Ok(Value::Array(self.methods().into_iter().map(Value::Str).collect())),
            "respond_to?" => {
                let name = args.first().and_then(Value::as_str).unwrap_or("");
                Ok(Value::Bool(self.methods().iter().any(|m| m == name)))
            }
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
        ["foo", "i", "throw_exception", "bar", "each", "methods", "respond_to?"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

/// The remote reference target minted by `Foo::bar`. Knows its own id
/// once registered so `release` can ask the registry to drop it.
struct Bar {
    initial_i: i64,
    id: Mutex<Option<ObjectId>>,
    registry: Arc<romp::Registry>,
}

impl Bar {
    fn new(initial_i: i64, registry: Arc<romp::Registry>) -> Self {
        Bar {
            initial_i,
            id: Mutex::new(None),
            registry,
        }
    }

    fn set_id(&self, id: ObjectId) {
        *self.id.lock().unwrap() = Some(id);
    }
}

impl RemoteObject for Bar {
    fn call(&self, method: &str, _args: Vec<Value>) -> Result<Value, Value> {
        match method {
            "i" => Ok(Value::Int(self.initial_i)),
            "release" => {
                if let Some(id) = *self.id.lock().unwrap() {
                    self.registry.delete_reference(id);
                }
                Ok(Value::Nil)
            }
            other => Err(Value::Str(format!("no such method: {other}"))),
        }
    }

    fn methods(&self) -> Vec<String> {
        vec!["i".to_string(), "release".to_string()]
    }
}

/// Binds a server on an ephemeral TCP port, registers `Foo` at name
/// `"foo"`, spawns the accept loop, and connects a client. Returns the
/// connected client plus a proxy already resolved to `"foo"`.
async fn start() -> (Client, romp::Proxy) {
    let endpoint = Endpoint::parse("tcpromp://127.0.0.1:0").unwrap();
    let server = Server::bind(&endpoint, ServerOptions::default()).await.unwrap();
    let registry = Arc::clone(server.registry());
    let foo = Foo::new(Arc::clone(&registry));
    let id = registry.register(Arc::new(foo)).unwrap();
    registry.bind("foo", id);

    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client_endpoint = Endpoint::parse(&format!("tcpromp://{}:{}", addr.ip(), addr.port())).unwrap();
    let client = Client::connect(&client_endpoint, ClientOptions::default()).await.unwrap();
    let proxy = client.resolve("foo").await.unwrap();
    (client, proxy)
}

#[tokio::test]
async fn call_roundtrips_the_method_result() {
    let (_client, foo) = start().await;
    let result = foo.call("foo", vec![Value::Int(42)]).await.unwrap();
    assert_eq!(result, Value::Int(42));
}

#[tokio::test]
async fn oneway_calls_apply_in_order_before_sync_returns() {
    let (_client, foo) = start().await;
    foo.oneway("foo", vec![Value::Int(1)]).await.unwrap();
    foo.oneway("foo", vec![Value::Int(2)]).await.unwrap();
    foo.sync().await.unwrap();
    let result = foo.call("i", vec![]).await.unwrap();
    assert_eq!(result, Value::Int(2));
}

#[tokio::test]
async fn call_block_delivers_every_yield_before_the_retval() {
    let (_client, foo) = start().await;
    let mut seen = Vec::new();
    let result = foo.call_block("each", vec![], |v| seen.push(v)).await.unwrap();
    assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(result, Value::Nil);
}

#[tokio::test]
async fn exception_backtrace_is_stitched_with_the_caller_frame() {
    let (_client, foo) = start().await;
    let err = foo.call("throw_exception", vec![]).await.unwrap_err();
    match err {
        RompError::Application(exc) => {
            assert_eq!(exc.class_name, "RuntimeError");
            assert_eq!(exc.message, "boom");
            assert_eq!(
                exc.backtrace,
                vec![
                    "Foo#throw_exception2".to_string(),
                    "Foo#throw_exception".to_string(),
                    "<romp call to throw_exception>".to_string(),
                ]
            );
        }
        other => panic!("expected an application exception, got {other:?}"),
    }
}

#[tokio::test]
async fn returned_object_reference_becomes_a_live_proxy() {
    let (_client, foo) = start().await;
    foo.call("foo", vec![Value::Int(9)]).await.unwrap(); // @i = 9
    let bar_value = foo.call("bar", vec![]).await.unwrap();
    let bar_id = match bar_value {
        Value::ObjectRef(id) => id,
        other => panic!("expected an ObjectRef, got {other:?}"),
    };
    let bar = foo.proxy_for_ref(bar_id);

    let i = bar.call("i", vec![]).await.unwrap();
    assert_eq!(i, Value::Int(10));

    bar.release().await.unwrap();
    bar.sync().await.unwrap(); // drains the session so release has run server-side

    let err = bar.call("i", vec![]).await.unwrap_err();
    assert!(matches!(err, RompError::Application(_)), "expected no-such-object exception, got {err:?}");
}

#[tokio::test]
async fn forbidden_method_names_never_cross_the_wire() {
    let (_client, foo) = start().await;

    let methods = foo.methods().await.unwrap();
    assert!(!methods.contains(&"dup".to_string()));
    assert!(!methods.contains(&"clone".to_string()));

    assert_eq!(foo.respond_to("clone").await.unwrap(), false);

    let err = foo.call("dup", vec![]).await.unwrap_err();
    assert!(matches!(err, RompError::NoSuchMethod(_)));

    assert_eq!(foo.respond_to("foo").await.unwrap(), true);
}

#[tokio::test]
async fn call_as_converts_the_return_value() {
    let (_client, foo) = start().await;
    let result: i64 = foo.call_as("foo", vec![Value::Int(7)]).await.unwrap();
    assert_eq!(result, 7);
}

#[tokio::test]
async fn proxy_can_be_passed_back_as_a_call_argument() {
    let (_client, foo) = start().await;
    let value: Value = (&foo).into();
    assert_eq!(value, Value::ObjectRef(foo.object_id()));
}
