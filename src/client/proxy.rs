// ABOUTME: Client-side proxy — drives the reply state machine over a shared session
// ABOUTME: Forbidden-method filtering and ObjectRef-to-Proxy rewriting happen here, not in the codec

use std::io::Cursor;
use std::sync::Arc;

use bytes::BytesMut;
use tracing::trace;

use crate::client::SessionHandle;
use crate::codec::{decode_value, encode_value, MessageType};
use crate::error::{RompError, RompResult};
use crate::registry::ObjectId;
use crate::value::Value;

/// Method names a [`Proxy`] never forwards to the server — Rust's own
/// `Clone`/`Display` machinery collides with these names, so they're
/// rejected locally instead of round-tripped.
const FORBIDDEN: &[&str] = &["clone", "dup", "display"];

/// A lightweight, cloneable handle to a remote object. Every `Proxy`
/// produced from the same [`crate::client::Client`] shares one session and
/// one call policy.
#[derive(Clone)]
pub struct Proxy {
    session: Arc<SessionHandle>,
    object_id: ObjectId,
}

impl Proxy {
    pub(crate) fn new(session: Arc<SessionHandle>, object_id: ObjectId) -> Self {
        Proxy { session, object_id }
    }

    /// The remote object id this proxy is bound to — exposed so a `Proxy`
    /// passed as a call argument can be re-encoded as `Value::ObjectRef`.
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Sends a REQUEST and waits for the terminating RETVAL/EXCEPTION. A
    /// YIELD frame arriving on a plain `call` is a protocol violation —
    /// only `call_block` negotiates block-yielding methods.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> RompResult<Value> {
        self.request(MessageType::Request, method, args, |_| {
            unreachable!("plain call never installs a yield sink")
        })
        .await
    }

    /// Like [`Proxy::call`], but with a REQUEST_BLOCK: `on_yield` runs once
    /// per YIELD frame the server sends before the terminating reply.
    pub async fn call_block<F>(&self, method: &str, args: Vec<Value>, on_yield: F) -> RompResult<Value>
    where
        F: FnMut(Value) + Send,
    {
        self.request(MessageType::RequestBlock, method, args, on_yield).await
    }

    /// Dispatches one REQUEST/REQUEST_BLOCK and drives the reply state
    /// machine, optionally under a [`crate::client::ClientOptions::call_timeout`].
    /// A timed-out call drops the session mutex
    /// guard mid-flight; any reply the server later sends for it is left
    /// unread on the wire, so a session that has timed out once should be
    /// treated as tainted rather than reused.
    async fn request<F>(&self, msg_type: MessageType, method: &str, args: Vec<Value>, on_yield: F) -> RompResult<Value>
    where
        F: FnMut(Value) + Send,
    {
        let call = self.request_uncancellable(msg_type, method, args, on_yield);
        match self.session.call_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| RompError::Protocol(format!("call to {method} timed out")))?,
            None => call.await,
        }
    }

    async fn request_uncancellable<F>(
        &self,
        msg_type: MessageType,
        method: &str,
        args: Vec<Value>,
        mut on_yield: F,
    ) -> RompResult<Value>
    where
        F: FnMut(Value) + Send,
    {
        reject_forbidden(method)?;
        let payload = encode_call(method, &args);

        let mut session = self.lock_session().await?;
        session.write_frame(msg_type, self.object_id, &payload).await?;

        loop {
            let (reply_type, _obj_id, reply_payload) = session.read_frame().await?;
            match reply_type {
                MessageType::Retval => {
                    let value = decode_value(&mut Cursor::new(&reply_payload[..]))?;
                    self.trace_refs(&value);
                    return Ok(value);
                }
                MessageType::Exception => {
                    let value = decode_value(&mut Cursor::new(&reply_payload[..]))?;
                    return Err(match value {
                        Value::Exception(exc) => {
                            RompError::Application(exc.push_frame(format!("<romp call to {method}>")))
                        }
                        other => RompError::Protocol(format!("EXCEPTION payload was not an exception: {other:?}")),
                    });
                }
                MessageType::Yield if msg_type == MessageType::RequestBlock => {
                    let value = decode_value(&mut Cursor::new(&reply_payload[..]))?;
                    self.trace_refs(&value);
                    on_yield(value);
                }
                MessageType::Sync => {
                    session.write_frame(MessageType::Sync, 1, &[]).await?;
                }
                other => {
                    return Err(RompError::Protocol(format!(
                        "unexpected reply frame while waiting on {method}: {other:?}"
                    )));
                }
            }
        }
    }

    /// Like [`Proxy::call`], but converts the returned [`Value`] into `T`.
    /// Ergonomic sugar over the single untyped `call` — there is no schema,
    /// so the conversion is checked at the call site via `TryFrom<Value>`
    /// rather than generated ahead of time.
    pub async fn call_as<T>(&self, method: &str, args: Vec<Value>) -> RompResult<T>
    where
        T: TryFrom<Value, Error = crate::value::ValueTypeError>,
    {
        let value = self.call(method, args).await?;
        T::try_from(value).map_err(RompError::from)
    }

    /// Sends a ONEWAY frame and returns immediately without waiting for any
    /// reply.
    pub async fn oneway(&self, method: &str, args: Vec<Value>) -> RompResult<()> {
        reject_forbidden(method)?;
        let payload = encode_call(method, &args);
        let mut session = self.lock_session().await?;
        session.write_frame(MessageType::Oneway, self.object_id, &payload).await
    }

    /// Sends a ONEWAY_SYNC frame and waits for exactly one NULL_MSG
    /// acknowledgement (sent by the server before it runs the call).
    pub async fn oneway_sync(&self, method: &str, args: Vec<Value>) -> RompResult<()> {
        reject_forbidden(method)?;
        let payload = encode_call(method, &args);
        let mut session = self.lock_session().await?;
        session
            .write_frame(MessageType::OnewaySync, self.object_id, &payload)
            .await?;

        let (reply_type, _obj_id, _payload) = session.read_frame().await?;
        match reply_type {
            MessageType::NullMsg => Ok(()),
            other => Err(RompError::Protocol(format!(
                "expected NULL_MSG acknowledging oneway_sync, got {other:?}"
            ))),
        }
    }

    /// Drains the connection: sends SYNC/obj_id=0, waits for SYNC/obj_id=1,
    /// discarding any other frame received in between.
    pub async fn sync(&self) -> RompResult<()> {
        let mut session = self.lock_session().await?;
        session.write_frame(MessageType::Sync, 0, &[]).await?;
        loop {
            let (reply_type, obj_id, _payload) = session.read_frame().await?;
            if reply_type == MessageType::Sync && obj_id == 1 {
                return Ok(());
            }
        }
    }

    /// Asks the server to drop this object from its registry. Implemented
    /// as a reserved oneway call, not a distinct message type — the base
    /// design leaves distributed GC out of scope, so release is purely a
    /// cooperative hint the application object may ignore.
    pub async fn release(&self) -> RompResult<()> {
        self.oneway("release", vec![]).await
    }

    /// Forwards to the server's `"methods"` call and strips the locally
    /// forbidden names from the result.
    pub async fn methods(&self) -> RompResult<Vec<String>> {
        let result = self.call("methods", vec![]).await?;
        match result {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .filter(|name| !FORBIDDEN.contains(&name.as_str()))
                .collect()),
            other => Err(RompError::Protocol(format!(
                "\"methods\" did not return an array: {other:?}"
            ))),
        }
    }

    /// Capability query. Forbidden names short-circuit to `false` without a
    /// round trip; everything else asks the server via `"respond_to?"`.
    pub async fn respond_to(&self, name: &str) -> RompResult<bool> {
        if FORBIDDEN.contains(&name) {
            return Ok(false);
        }
        let result = self.call("respond_to?", vec![name.into()]).await?;
        match result {
            Value::Bool(b) => Ok(b),
            other => Err(RompError::Protocol(format!(
                "\"respond_to?\" did not return a boolean: {other:?}"
            ))),
        }
    }

    async fn lock_session(&self) -> RompResult<tokio::sync::MutexGuard<'_, crate::session::Session>> {
        if self.session.synchronized {
            Ok(self.session.session.lock().await)
        } else {
            self.session.session.try_lock().map_err(|_| {
                RompError::Protocol("session busy with another call (unsynchronized client)".to_string())
            })
        }
    }

    /// Builds a proxy for an `ObjectRef` id found inside a call result,
    /// sharing this proxy's session. `Value` itself stays free of a
    /// `Proxy` variant (that would make the codec's value domain depend on
    /// `client`, inverting the crate's module layering), so callers pull
    /// `Value::ObjectRef` ids out of a result with [`Value::object_refs`]
    /// and turn each one into a proxy explicitly via this method.
    pub fn proxy_for_ref(&self, id: ObjectId) -> Proxy {
        Proxy::new(Arc::clone(&self.session), id)
    }

    fn trace_refs(&self, value: &Value) {
        let refs = value.object_refs();
        if !refs.is_empty() {
            trace!(?refs, "call result carries object references");
        }
    }
}

/// Lets a `Proxy` be passed back in as a call argument — it round-trips
/// through its bound object id exactly like any other `ObjectRef`, so a
/// server receiving it sees the same value it would have produced by
/// handing out a reference in the first place.
impl From<&Proxy> for Value {
    fn from(proxy: &Proxy) -> Self {
        Value::ObjectRef(proxy.object_id)
    }
}

fn reject_forbidden(method: &str) -> RompResult<()> {
    if FORBIDDEN.contains(&method) {
        Err(RompError::NoSuchMethod(method.to_string()))
    } else {
        Ok(())
    }
}

fn encode_call(method: &str, args: &[Value]) -> bytes::Bytes {
    let mut items = vec![Value::Str(method.to_string())];
    items.extend(args.iter().cloned());
    let mut buf = BytesMut::new();
    encode_value(&Value::Array(items), &mut buf);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_methods_are_rejected_locally() {
        assert!(reject_forbidden("clone").is_err());
        assert!(reject_forbidden("dup").is_err());
        assert!(reject_forbidden("display").is_err());
        assert!(reject_forbidden("anything_else").is_ok());
    }

    #[test]
    fn encode_call_puts_method_name_first() {
        let payload = encode_call("foo", &[Value::Int(1), Value::Int(2)]);
        let decoded = decode_value(&mut Cursor::new(&payload[..])).unwrap();
        assert_eq!(
            decoded,
            Value::Array(vec![Value::Str("foo".to_string()), Value::Int(1), Value::Int(2)])
        );
    }
}
