// ABOUTME: Server-side object registry — id allocation, name binding, and the resolver object
// ABOUTME: The only server-side shared state; every operation is atomic under one mutex

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::value::Value;

/// A 16-bit object id. Id `0` is reserved for the resolver and never
/// appears in the free list.
pub type ObjectId = u16;

/// Population cap: ids `0..=u16::MAX`, i.e. 65 536 live objects.
pub const MAX_ID: u32 = u16::MAX as u32 + 1;

/// A server-side object reachable by id. Implemented by application
/// objects as well as the built-in [`Resolver`].
///
/// Methods run synchronously on the dispatch task; the runtime wraps the
/// call in `catch_unwind` so a panicking method cannot take the whole
/// connection down with it.
pub trait RemoteObject: Send + Sync {
    /// Invokes `method` with `args`, returning either the method's result
    /// or an application-level error value.
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value>;

    /// Invokes a block-yielding method. `yield_value` is called once per
    /// yield, synchronously, before the method resumes — the server
    /// worker does not wait for any acknowledgement from the client
    /// between yields. The default implementation rejects every method as non-block
    /// capable; objects exposing an iterator override this.
    fn call_block(
        &self,
        method: &str,
        args: Vec<Value>,
        yield_value: &mut dyn FnMut(Value),
    ) -> Result<Value, Value> {
        let _ = yield_value;
        self.call(method, args)
    }

    /// The method names this object answers to, used by `Proxy::methods()`
    /// (after local forbidden-name scrubbing on the client side).
    fn methods(&self) -> Vec<String>;
}

/// Errors raised by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("object id population limit ({MAX_ID}) exceeded")]
    LimitExceeded,

    #[error("no such object: {0}")]
    NoSuchObject(ObjectId),
}

struct RegistryState {
    next_id: u32,
    free_ids: BTreeSet<ObjectId>,
    objects: HashMap<ObjectId, Arc<dyn RemoteObject>>,
    names: HashMap<String, ObjectId>,
}

/// Server-side map from object id to live object, plus a name→id binding
/// table. Created once per [`crate::server::Server`], mutated only under
/// its internal mutex, dropped on server shutdown.
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Builds a fresh registry with the resolver pre-registered at id 0.
    pub fn new() -> Arc<Self> {
        let registry = Arc::new(Registry {
            state: Mutex::new(RegistryState {
                next_id: 1, // id 0 is reserved below
                free_ids: BTreeSet::new(),
                objects: HashMap::new(),
                names: HashMap::new(),
            }),
        });
        {
            let mut state = registry.state.lock().expect("registry mutex poisoned");
            state
                .objects
                .insert(0, Arc::new(Resolver::new(Arc::clone(&registry))));
        }
        registry
    }

    /// Registers `obj` and returns its freshly allocated id.
    ///
    /// Prefers popping the smallest free id (so a heavily recycled
    /// registry doesn't grow `next_id` unnecessarily); only allocates a
    /// fresh id when the free list is empty. Either way, `next_id` itself
    /// only ever advances when a *fresh* id is handed out; a free-list pop
    /// never shrinks the effective id space (see DESIGN.md).
    pub fn register(&self, obj: Arc<dyn RemoteObject>) -> Result<ObjectId, RegistryError> {
        let mut state = self.state.lock().expect("registry mutex poisoned");
        let id = if let Some(&id) = state.free_ids.iter().next() {
            state.free_ids.remove(&id);
            id
        } else if state.next_id < MAX_ID {
            let id = state.next_id as ObjectId;
            state.next_id += 1;
            id
        } else {
            return Err(RegistryError::LimitExceeded);
        };
        state.objects.insert(id, obj);
        Ok(id)
    }

    /// Removes `id`'s entry. The id is deliberately **not** returned to
    /// the free list — a stale remote handle held by a client should fail
    /// loudly on its next call rather than silently aliasing whatever
    /// object a later `register` happens to reuse that id for.
    pub fn unregister(&self, id: ObjectId) {
        let mut state = self.state.lock().expect("registry mutex poisoned");
        state.objects.remove(&id);
    }

    pub fn get(&self, id: ObjectId) -> Option<Arc<dyn RemoteObject>> {
        let state = self.state.lock().expect("registry mutex poisoned");
        state.objects.get(&id).cloned()
    }

    pub fn bind(&self, name: &str, id: ObjectId) {
        let mut state = self.state.lock().expect("registry mutex poisoned");
        state.names.insert(name.to_string(), id);
    }

    pub fn resolve(&self, name: &str) -> Option<ObjectId> {
        let state = self.state.lock().expect("registry mutex poisoned");
        state.names.get(name).copied()
    }

    /// Registers `obj` and returns a wire value pointing at it. Application
    /// code calls this explicitly when it wants to hand a caller a proxy
    /// instead of a by-value copy.
    pub fn create_reference(&self, obj: Arc<dyn RemoteObject>) -> Result<Value, RegistryError> {
        self.register(obj).map(Value::ObjectRef)
    }

    /// Convenience wrapper for unregistering an object already known by id
    /// (the counterpart application code calls from inside a method body
    /// reached via that same id, e.g. a `release` handler).
    pub fn delete_reference(&self, id: ObjectId) {
        self.unregister(id);
    }
}

/// The well-known object at id 0. Exposes a single method, `resolve`,
/// that looks a name up in the registry's name table.
pub struct Resolver {
    registry: Arc<Registry>,
}

impl Resolver {
    fn new(registry: Arc<Registry>) -> Self {
        Resolver { registry }
    }
}

impl RemoteObject for Resolver {
    fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
        match method {
            "resolve" => {
                let name = args.first().and_then(Value::as_str).ok_or_else(|| {
                    Value::Str("resolve expects a single string argument".to_string())
                })?;
                match self.registry.resolve(name) {
                    Some(id) => Ok(Value::Int(id as i64)),
                    None => Err(Value::Str(format!("no object bound to name {name:?}"))),
                }
            }
            other => Err(Value::Str(format!("no such method: {other}"))),
        }
    }

    fn methods(&self) -> Vec<String> {
        vec!["resolve".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    impl RemoteObject for Echo {
        fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, Value> {
            match method {
                "echo" => Ok(args.into_iter().next().unwrap_or(Value::Nil)),
                other => Err(Value::Str(format!("no such method: {other}"))),
            }
        }
        fn methods(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }
    }

    #[test]
    fn bind_then_resolve_finds_the_registered_object() {
        let registry = Registry::new();
        let id = registry.register(Arc::new(Echo)).unwrap();
        registry.bind("echo", id);
        let resolved = registry.resolve("echo").unwrap();
        assert_eq!(resolved, id);
        assert!(registry.get(resolved).is_some());
    }

    #[test]
    fn unregister_does_not_recycle_the_id() {
        let registry = Registry::new();
        let id = registry.register(Arc::new(Echo)).unwrap();
        registry.unregister(id);
        assert!(registry.get(id).is_none());

        let other = registry.register(Arc::new(Echo)).unwrap();
        assert_ne!(id, other, "freed ids must not be handed out again");
    }

    #[test]
    fn resolver_lives_at_id_zero() {
        let registry = Registry::new();
        assert!(registry.get(0).is_some());
    }

    #[test]
    fn resolver_resolves_bound_names() {
        let registry = Registry::new();
        let id = registry.register(Arc::new(Echo)).unwrap();
        registry.bind("echo", id);

        let resolver = registry.get(0).unwrap();
        let result = resolver
            .call("resolve", vec![Value::Str("echo".to_string())])
            .unwrap();
        assert_eq!(result, Value::Int(id as i64));
    }

    #[test]
    fn resolve_of_unbound_name_is_an_application_error() {
        let registry = Registry::new();
        let resolver = registry.get(0).unwrap();
        let result = resolver.call("resolve", vec![Value::Str("nope".to_string())]);
        assert!(result.is_err());
    }
}
