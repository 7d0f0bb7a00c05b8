// ABOUTME: Per-connection dispatch loop — reads a frame, resolves the object, runs the interaction
// ABOUTME: Panics and application errors are both caught here and turned into EXCEPTION replies

use std::io::Cursor;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, instrument, trace, warn};

use crate::codec::{decode_value, encode_value, MessageType};
use crate::error::RompError;
use crate::registry::{Registry, RemoteObject};
use crate::session::Session;
use crate::transport::Stream;
use crate::value::{ExceptionValue, Value};

/// Drives one accepted connection until the peer disconnects, a fatal I/O
/// error occurs, or a protocol violation is observed.
#[instrument(skip(stream, registry), fields(debug))]
pub async fn run_session(stream: Stream, registry: Arc<Registry>, debug: bool) -> Result<(), RompError> {
    let mut session = Session::new(stream);

    loop {
        let (msg_type, obj_id, payload) = match session.read_frame().await {
            Ok(frame) => frame,
            Err(RompError::ConnectionClosed) => {
                debug!("peer disconnected");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        trace!(?msg_type, obj_id, "dispatching frame");

        let obj = match registry.get(obj_id) {
            Some(obj) => obj,
            None => {
                if matches!(msg_type, MessageType::Request | MessageType::RequestBlock) {
                    let exc = ExceptionValue::new("NoSuchObjectError", format!("no such object: {obj_id}"));
                    send_exception(&mut session, exc).await?;
                }
                continue;
            }
        };

        match msg_type {
            MessageType::Request => handle_request(&mut session, &obj, payload).await?,
            MessageType::RequestBlock => handle_request_block(&mut session, &obj, payload).await?,
            MessageType::Oneway => {
                handle_oneway(&obj, payload, debug);
            }
            MessageType::OnewaySync => {
                session.write_frame(MessageType::NullMsg, 0, &[]).await?;
                handle_oneway(&obj, payload, debug);
            }
            MessageType::Sync if obj_id == 0 => {
                session.write_frame(MessageType::Sync, 1, &[]).await?;
            }
            MessageType::Sync => {
                // obj_id == 1: a spurious sync reply arriving on the
                // server's read side. Ignored per the base design.
            }
            other => {
                return Err(RompError::Protocol(format!(
                    "unexpected message type from client: {other:?}"
                )));
            }
        }
    }
}

fn decode_call(payload: &bytes::Bytes) -> Result<(String, Vec<Value>), RompError> {
    let mut cursor = Cursor::new(&payload[..]);
    let call = decode_value(&mut cursor)?;
    match call {
        Value::Array(mut items) if !items.is_empty() => {
            let method = items.remove(0);
            let method = method
                .as_str()
                .ok_or_else(|| RompError::Protocol("call method name is not a string".to_string()))?
                .to_string();
            Ok((method, items))
        }
        _ => Err(RompError::Protocol("call payload is not [method, args...]".to_string())),
    }
}

/// Runs `obj.call`/`obj.call_block` with panics converted into an
/// application exception, so a misbehaving method can't take the dispatch
/// task down with it.
fn invoke(obj: &Arc<dyn RemoteObject>, method: &str, args: Vec<Value>) -> Result<Value, ExceptionValue> {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| obj.call(method, args)));
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Value::Exception(exc))) => Err(exc),
        Ok(Err(other)) => Err(ExceptionValue::new("ApplicationError", describe(&other))),
        Err(panic) => Err(ExceptionValue::new("PanicError", panic_message(&panic))),
    }
}

fn invoke_block(
    obj: &Arc<dyn RemoteObject>,
    method: &str,
    args: Vec<Value>,
    yield_value: &mut dyn FnMut(Value),
) -> Result<Value, ExceptionValue> {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| obj.call_block(method, args, yield_value)));
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Value::Exception(exc))) => Err(exc),
        Ok(Err(other)) => Err(ExceptionValue::new("ApplicationError", describe(&other))),
        Err(panic) => Err(ExceptionValue::new("PanicError", panic_message(&panic))),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "method panicked with a non-string payload".to_string()
    }
}

async fn handle_request(session: &mut Session, obj: &Arc<dyn RemoteObject>, payload: bytes::Bytes) -> Result<(), RompError> {
    let (method, args) = match decode_call(&payload) {
        Ok(call) => call,
        Err(err) => {
            send_exception(session, ExceptionValue::new("CodecError", err.to_string())).await?;
            return Ok(());
        }
    };

    match invoke(obj, &method, args) {
        Ok(value) => send_retval(session, value).await,
        Err(exc) => send_exception(session, exc).await,
    }
}

async fn handle_request_block(
    session: &mut Session,
    obj: &Arc<dyn RemoteObject>,
    payload: bytes::Bytes,
) -> Result<(), RompError> {
    let (method, args) = match decode_call(&payload) {
        Ok(call) => call,
        Err(err) => {
            send_exception(session, ExceptionValue::new("CodecError", err.to_string())).await?;
            return Ok(());
        }
    };

    // Yields are collected synchronously inside the method body (the
    // server "fire and forgets" each one — §9's rendezvous iterator — so
    // the frames are buffered here and flushed in order once the method
    // returns, rather than interleaving an `.await` into the closure the
    // synchronous `call_block` trait method drives.
    let mut yields = Vec::new();
    let outcome = invoke_block(obj, &method, args, &mut |value| yields.push(value));

    for value in yields {
        let mut buf = BytesMut::new();
        encode_value(&value, &mut buf);
        session.write_frame(MessageType::Yield, 0, &buf).await?;
    }

    match outcome {
        Ok(value) => send_retval(session, value).await,
        Err(exc) => send_exception(session, exc).await,
    }
}

fn handle_oneway(obj: &Arc<dyn RemoteObject>, payload: bytes::Bytes, debug: bool) {
    let (method, args) = match decode_call(&payload) {
        Ok(call) => call,
        Err(err) => {
            if debug {
                warn!(error = %err, "oneway call payload was malformed");
            }
            return;
        }
    };
    if let Err(exc) = invoke(obj, &method, args) {
        if debug {
            warn!(class = %exc.class_name, message = %exc.message, "oneway call raised an error");
        }
    }
}

async fn send_retval(session: &mut Session, value: Value) -> Result<(), RompError> {
    let mut buf = BytesMut::new();
    encode_value(&value, &mut buf);
    session.write_frame(MessageType::Retval, 0, &buf).await
}

async fn send_exception(session: &mut Session, exc: ExceptionValue) -> Result<(), RompError> {
    let mut buf = BytesMut::new();
    encode_value(&Value::Exception(exc), &mut buf);
    session.write_frame(MessageType::Exception, 0, &buf).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    struct Echo;
    impl RemoteObject for Echo {
        fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
            match method {
                "foo" => Ok(args.into_iter().next().unwrap_or(Value::Nil)),
                "boom" => Err(Value::Str("kaboom".to_string())),
                "panic" => panic!("deliberate panic for test coverage"),
                other => Err(Value::Str(format!("no such method: {other}"))),
            }
        }

        fn call_block(
            &self,
            method: &str,
            _args: Vec<Value>,
            yield_value: &mut dyn FnMut(Value),
        ) -> Result<Value, Value> {
            if method == "each" {
                for i in 1..=3 {
                    yield_value(Value::Int(i));
                }
                Ok(Value::Nil)
            } else {
                Err(Value::Str(format!("no such method: {method}")))
            }
        }

        fn methods(&self) -> Vec<String> {
            vec!["foo".to_string(), "boom".to_string(), "each".to_string()]
        }
    }

    fn call_payload(method: &str, args: Vec<Value>) -> bytes::Bytes {
        let mut items = vec![Value::Str(method.to_string())];
        items.extend(args);
        let mut buf = BytesMut::new();
        encode_value(&Value::Array(items), &mut buf);
        buf.freeze()
    }

    #[test]
    fn decode_call_splits_method_and_args() {
        let payload = call_payload("foo", vec![Value::Int(42)]);
        let (method, args) = decode_call(&payload).unwrap();
        assert_eq!(method, "foo");
        assert_eq!(args, vec![Value::Int(42)]);
    }

    #[test]
    fn invoke_turns_application_error_into_exception_value() {
        let registry = Registry::new();
        let id = registry.register(Arc::new(Echo)).unwrap();
        let obj = registry.get(id).unwrap();
        let err = invoke(&obj, "boom", vec![]).unwrap_err();
        assert_eq!(err.message, "kaboom");
    }

    #[test]
    fn invoke_catches_panics_as_exceptions() {
        let registry = Registry::new();
        let id = registry.register(Arc::new(Echo)).unwrap();
        let obj = registry.get(id).unwrap();
        let err = invoke(&obj, "panic", vec![]).unwrap_err();
        assert_eq!(err.class_name, "PanicError");
    }

    #[test]
    fn invoke_block_collects_every_yield_in_order() {
        let registry = Registry::new();
        let id = registry.register(Arc::new(Echo)).unwrap();
        let obj = registry.get(id).unwrap();
        let mut seen = Vec::new();
        let result = invoke_block(&obj, "each", vec![], &mut |v| seen.push(v));
        assert!(result.is_ok());
        assert_eq!(seen, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }
}
