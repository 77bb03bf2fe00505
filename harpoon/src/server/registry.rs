//! Service registry and static dispatch table.
//!
//! A [`MethodDescriptor`] binds one remote-callable method to a uniform,
//! type-erased invocation entry point. The binding is built **once** at
//! registration time by [`ServiceBuilder`]: the typed closure captures the
//! codec and the argument/reply types, so the per-call cost is decode →
//! call → encode only. This is the registration glue a build-time stub
//! generator would emit; writing it by hand looks like:
//!
//! ```rust
//! use harpoon::{BincodeCodec, ServiceBuilder};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct AddArgs { a: i64, b: i64 }
//! #[derive(Serialize, Deserialize)]
//! struct AddReply { sum: i64 }
//!
//! let service = ServiceBuilder::new("Calc", BincodeCodec)
//!     .method("Add", |args: AddArgs| async move {
//!         Ok::<_, std::convert::Infallible>(AddReply { sum: args.a + args.b })
//!     })
//!     .finish();
//! assert!(service.method("Add").is_some());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::codec::Codec;
use crate::error::DispatchError;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Uniform invocation entry point: encoded arguments in, encoded reply out.
type MethodFn = Box<dyn Fn(Vec<u8>) -> BoxFuture<Result<Vec<u8>, DispatchError>> + Send + Sync>;

/// One remote-callable method: its name plus the bound entry point.
/// Immutable after registration.
pub struct MethodDescriptor {
    name: String,
    handler: MethodFn,
}

impl MethodDescriptor {
    /// Method name within its service.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode-invoke-encode for one request.
    pub async fn invoke(&self, params: Vec<u8>) -> Result<Vec<u8>, DispatchError> {
        (self.handler)(params).await
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .finish()
    }
}

/// A named service with its method table.
#[derive(Debug)]
pub struct ServiceDescriptor {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl ServiceDescriptor {
    /// Service name, as addressed by request envelopes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// Registered method names, for diagnostics.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Builds a [`ServiceDescriptor`] by binding typed handlers.
///
/// The codec is fixed per service at build time and must match the server's
/// wire codec, since argument payloads are decoded with it.
pub struct ServiceBuilder<C: Codec> {
    name: String,
    codec: C,
    methods: HashMap<String, MethodDescriptor>,
}

impl<C: Codec> ServiceBuilder<C> {
    /// Start a descriptor for the service `name`.
    pub fn new(name: impl Into<String>, codec: C) -> Self {
        Self {
            name: name.into(),
            codec,
            methods: HashMap::new(),
        }
    }

    /// Bind one method.
    ///
    /// `handler` is the service implementation for this method; capture the
    /// service instance in the closure. Its error type is carried back to
    /// the caller as text in a `Failed` response.
    pub fn method<Args, Reply, E, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        Args: DeserializeOwned + Send + 'static,
        Reply: Serialize + Send + 'static,
        E: std::fmt::Display,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply, E>> + Send + 'static,
    {
        let codec = self.codec.clone();
        let handler = Arc::new(handler);
        let erased: MethodFn = Box::new(move |params| {
            let codec = codec.clone();
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                let args: Args = codec.decode(&params).map_err(DispatchError::DecodeArgs)?;
                let reply = handler(args)
                    .await
                    .map_err(|e| DispatchError::Application(e.to_string()))?;
                codec.encode(&reply).map_err(DispatchError::EncodeReply)
            })
        });
        self.methods.insert(
            name.to_string(),
            MethodDescriptor {
                name: name.to_string(),
                handler: erased,
            },
        );
        self
    }

    /// Finalize the descriptor.
    pub fn finish(self) -> ServiceDescriptor {
        ServiceDescriptor {
            name: self.name,
            methods: self.methods,
        }
    }
}

/// Concurrent-safe table from service name to descriptor.
///
/// Registration is expected once at startup; lookups are per-request and
/// read-heavy, hence the read-write lock.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<ServiceDescriptor>>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-if-absent by service name. Returns `false` (keeping the
    /// existing descriptor) if the name is already registered, making
    /// repeated registration idempotent.
    pub fn register(&self, descriptor: ServiceDescriptor) -> bool {
        let mut services = self.services.write().expect("service table lock poisoned");
        match services.entry(descriptor.name.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(Arc::new(descriptor));
                true
            }
        }
    }

    /// Look up a service by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services
            .read()
            .expect("service table lock poisoned")
            .get(name)
            .cloned()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services
            .read()
            .expect("service table lock poisoned")
            .len()
    }

    /// Whether no services are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
