//! Handler registry
//!
//! Maps method names to typed handlers. Input and output types are the
//! generic parameters supplied at registration; the registry erases them
//! behind a closure that decodes the raw input, runs the handler and encodes
//! the result.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures::future::{self, BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bridge::BridgeError;
use crate::codec::Codec;

/// Description of a registered handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerInfo {
    pub method: String,
    /// Input type name, `None` for zero-argument handlers
    pub input: Option<String>,
    pub output: String,
}

type ErasedHandler =
    dyn Fn(Option<&str>, &Codec) -> BoxFuture<'static, Result<String, BridgeError>> + Send + Sync;

struct HandlerEntry {
    info: HandlerInfo,
    call: Box<ErasedHandler>,
}

/// Method name → handler table shared by one bridge
pub struct HandlerRegistry {
    codec: Codec,
    handlers: RwLock<HashMap<String, Arc<HandlerEntry>>>,
}

impl HandlerRegistry {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Register an async handler taking a decoded `I`
    ///
    /// A later registration under the same method replaces this one. Returns
    /// `true` when an earlier handler was replaced.
    pub fn register<I, O, F, Fut>(&self, method: impl Into<String>, handler: F) -> bool
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        let method = method.into();
        let info = HandlerInfo {
            method: method.clone(),
            input: Some(type_name::<I>().to_string()),
            output: type_name::<O>().to_string(),
        };

        let call = move |raw: Option<&str>, codec: &Codec| {
            let input = match codec.decode::<I>(raw.unwrap_or("null")) {
                Ok(input) => input,
                Err(err) => return future::ready(Err(err)).boxed(),
            };
            run_guarded(&handler, input, codec.clone())
        };

        self.insert(method, info, Box::new(call))
    }

    /// Register an async handler that takes no input; `data` is never decoded
    pub fn register_no_input<O, F, Fut>(&self, method: impl Into<String>, handler: F) -> bool
    where
        O: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        let method = method.into();
        let info = HandlerInfo {
            method: method.clone(),
            input: None,
            output: type_name::<O>().to_string(),
        };

        let call = move |_raw: Option<&str>, codec: &Codec| {
            run_guarded(&|()| handler(), (), codec.clone())
        };

        self.insert(method, info, Box::new(call))
    }

    /// Register a plain closure taking a decoded `I`
    pub fn register_sync<I, O, F>(&self, method: impl Into<String>, handler: F) -> bool
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.register(method, move |input: I| future::ready(handler(input)))
    }

    /// Register a plain zero-argument closure
    pub fn register_sync_no_input<O, F>(&self, method: impl Into<String>, handler: F) -> bool
    where
        O: Serialize + Send + 'static,
        F: Fn() -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.register_no_input(method, move || future::ready(handler()))
    }

    fn insert(&self, method: String, info: HandlerInfo, call: Box<ErasedHandler>) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = handlers
            .insert(method.clone(), Arc::new(HandlerEntry { info, call }))
            .is_some();
        if replaced {
            debug!(method = %method, "Replaced existing handler");
        } else {
            debug!(method = %method, "Registered handler");
        }
        replaced
    }

    pub fn unregister(&self, method: &str) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(method)
            .is_some()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(method)
    }

    /// Registered handlers, sorted by method name
    pub fn methods(&self) -> Vec<HandlerInfo> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<HandlerInfo> = handlers.values().map(|e| e.info.clone()).collect();
        infos.sort_by(|a, b| a.method.cmp(&b.method));
        infos
    }

    /// Run the handler for `method` against a raw wire input
    ///
    /// The handler is invoked at most once. Its `Err` results and panics both
    /// come back as [`BridgeError::HandlerThrew`].
    pub async fn dispatch(&self, method: &str, raw_input: Option<&str>) -> Result<String, BridgeError> {
        let entry = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned()
            .ok_or_else(|| BridgeError::HandlerNotFound(method.to_string()))?;

        (entry.call)(raw_input, &self.codec).await
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("codec", &self.codec.format_name())
            .field("methods", &self.methods())
            .finish()
    }
}

fn run_guarded<I, O, F, Fut>(
    handler: &F,
    input: I,
    codec: Codec,
) -> BoxFuture<'static, Result<String, BridgeError>>
where
    O: Serialize + Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(input))) {
        Ok(fut) => fut,
        Err(panic) => return future::ready(Err(threw_from_panic(panic))).boxed(),
    };

    async move {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(output)) => codec.encode(&output),
            Ok(Err(err)) => Err(BridgeError::HandlerThrew(format!("{:#}", err))),
            Err(panic) => Err(threw_from_panic(panic)),
        }
    }
    .boxed()
}

fn threw_from_panic(panic: Box<dyn Any + Send>) -> BridgeError {
    let message = if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    };
    BridgeError::HandlerThrew(message)
}
