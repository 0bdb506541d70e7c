//! The native bridge object
//!
//! [`NativeBridge`] ties a [`HandlerRegistry`] to whichever transport is
//! currently attached. Inbound envelopes and outbound events flow through
//! one ordered queue per bridge, so handlers never run concurrently with
//! each other.
//!
//! Ordering between a settlement and an independent [`NativeBridge::emit`]
//! is best-effort FIFO on the single outbound channel. Callers must not rely
//! on anything stronger.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::queue::{spawn_queue, Task, TaskSender};
use super::BridgeError;
use crate::codec::{Codec, JsonWire, WireFormat};
use crate::config::BridgeConfig;
use crate::protocol::{salvage_callback_id, OutboundRequest, ScriptCall};
use crate::registry::{HandlerInfo, HandlerRegistry};
use crate::script;
use crate::transport::{InboundSink, TransportAdapter};

/// Built-in method answering with the sorted registered method names
pub const METHOD_LIST: &str = "__bridge.methods";

/// Builder for [`NativeBridge`]
///
/// A wire format must be supplied explicitly (or through
/// [`BridgeBuilder::from_config`]); building without one fails with
/// [`BridgeError::SerializerMisconfigured`].
#[derive(Debug, Default)]
pub struct BridgeBuilder {
    config: BridgeConfig,
    wire: Option<Arc<dyn WireFormat>>,
}

impl BridgeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `config`, using the JSON wire format it describes
    pub fn from_config(config: BridgeConfig) -> Self {
        let wire = if config.pretty_wire {
            JsonWire::pretty()
        } else {
            JsonWire::new()
        };
        Self {
            config,
            wire: Some(Arc::new(wire)),
        }
    }

    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn wire_format(mut self, wire: impl WireFormat + 'static) -> Self {
        self.wire = Some(Arc::new(wire));
        self
    }

    /// Build the bridge and start its queue on the current Tokio runtime
    pub fn build(self) -> Result<NativeBridge, BridgeError> {
        let wire = self.wire.ok_or(BridgeError::SerializerMisconfigured)?;
        self.config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            BridgeError::Config(crate::config::ConfigError::Invalid(format!(
                "bridge must be built inside a Tokio runtime: {}",
                e
            )))
        })?;

        let bootstrap =
            script::render_bootstrap(&self.config.namespace, self.config.call_timeout_ms)?;
        let (queue, tasks) = mpsc::unbounded_channel();

        let inner = Arc::new(BridgeInner {
            session_id: Uuid::new_v4(),
            global: script::global_expression(&self.config.namespace),
            bootstrap,
            config: self.config,
            registry: HandlerRegistry::new(Codec::from_shared(wire)),
            transport: RwLock::new(None),
            attached: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            queue,
            worker: Mutex::new(None),
        });

        let worker = spawn_queue(&runtime, Arc::downgrade(&inner), tasks);
        *inner.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);

        info!(
            session = %inner.session_id,
            namespace = %inner.config.namespace,
            wire = inner.registry.codec().format_name(),
            "Bridge created"
        );
        Ok(NativeBridge { inner })
    }
}

/// Native end of the bridge for one logical session
#[derive(Clone)]
pub struct NativeBridge {
    inner: Arc<BridgeInner>,
}

pub(crate) struct BridgeInner {
    session_id: Uuid,
    config: BridgeConfig,
    global: String,
    bootstrap: String,
    registry: HandlerRegistry,
    transport: RwLock<Option<Arc<dyn TransportAdapter>>>,
    attached: AtomicBool,
    disposed: AtomicBool,
    generation: AtomicU64,
    queue: TaskSender,
    worker: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl NativeBridge {
    pub fn builder() -> BridgeBuilder {
        BridgeBuilder::new()
    }

    /// Bridge with the JSON wire format and the given configuration
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        BridgeBuilder::from_config(config).build()
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    pub fn codec(&self) -> &Codec {
        self.inner.registry.codec()
    }

    /// Script expression naming the bridge global, e.g. `window.NativeBridge`
    pub fn global(&self) -> &str {
        &self.inner.global
    }

    /// Bootstrap script alone, without any transport polyfill.
    /// See [`NativeBridge::injection_script`].
    pub fn bootstrap_script(&self) -> &str {
        &self.inner.bootstrap
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn methods(&self) -> Vec<HandlerInfo> {
        self.inner.registry.methods()
    }

    /// See [`HandlerRegistry::register`]
    pub fn register<I, O, F, Fut>(&self, method: impl Into<String>, handler: F) -> bool
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        self.inner.registry.register(method, handler)
    }

    /// See [`HandlerRegistry::register_no_input`]
    pub fn register_no_input<O, F, Fut>(&self, method: impl Into<String>, handler: F) -> bool
    where
        O: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        self.inner.registry.register_no_input(method, handler)
    }

    /// See [`HandlerRegistry::register_sync`]
    pub fn register_sync<I, O, F>(&self, method: impl Into<String>, handler: F) -> bool
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.inner.registry.register_sync(method, handler)
    }

    /// See [`HandlerRegistry::register_sync_no_input`]
    pub fn register_sync_no_input<O, F>(&self, method: impl Into<String>, handler: F) -> bool
    where
        O: Serialize + Send + 'static,
        F: Fn() -> anyhow::Result<O> + Send + Sync + 'static,
    {
        self.inner.registry.register_sync_no_input(method, handler)
    }

    /// Bind `transport`, replacing any previous one
    ///
    /// Work queued under the previous attachment is discarded.
    pub async fn attach(&self, transport: Arc<dyn TransportAdapter>) -> Result<(), BridgeError> {
        if self.is_disposed() {
            return Err(BridgeError::Disposed);
        }

        let mut slot = self.inner.transport.write().await;
        if self.is_disposed() {
            return Err(BridgeError::Disposed);
        }
        if let Some(previous) = slot.take() {
            previous.bind(None);
        }

        transport.bind(Some(self.inbound_sink()));
        let kind = transport.kind();
        *slot = Some(transport);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.attached.store(true, Ordering::SeqCst);

        info!(session = %self.inner.session_id, transport = %kind, "Transport attached");
        Ok(())
    }

    /// Unbind the current transport; later `handle_incoming`/`emit` calls are
    /// no-ops until the next `attach`
    pub async fn detach(&self) {
        let mut slot = self.inner.transport.write().await;
        self.inner.attached.store(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = slot.take() {
            previous.bind(None);
            info!(session = %self.inner.session_id, transport = %previous.kind(), "Transport detached");
        }
    }

    /// Detach and stop the queue. Idempotent; the bridge stays inert.
    ///
    /// A delivery still in progress is cancelled and awaited, so nothing
    /// reaches the embedded context once this returns, even when the host's
    /// evaluator never completes.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.detach().await;
        let worker = self
            .inner
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        info!(session = %self.inner.session_id, "Bridge disposed");

        if let Some(worker) = worker {
            worker.abort();
            let _ = worker.await;
        }
    }

    /// Queue a raw envelope received from the embedded side
    pub fn handle_incoming(&self, raw: impl Into<String>) {
        self.inner.handle_incoming(raw.into());
    }

    /// Broadcast `event` to embedded listeners
    ///
    /// A no-op while detached or after dispose. Only an encoding failure is
    /// reported; delivery problems are logged.
    pub fn emit<T: Serialize + ?Sized>(&self, event: &str, value: &T) -> Result<(), BridgeError> {
        if !self.inner.accepting() {
            debug!(session = %self.inner.session_id, event = %event, "Dropping event while inactive");
            return Ok(());
        }

        let payload = self.codec().encode(value)?;
        self.inner.enqueue(Task::Emit {
            event: event.to_string(),
            payload,
            generation: self.inner.current_generation(),
        });
        Ok(())
    }

    /// Hook for the surface's "navigation started" signal
    ///
    /// The current page is going away, so work queued for it is discarded
    /// and its settlements are never delivered.
    pub fn on_navigation_started(&self) {
        if self.is_disposed() {
            return;
        }
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        debug!(session = %self.inner.session_id, "Navigation started, discarding queued work");
    }

    /// Hook for the surface's "navigation completed" signal
    ///
    /// The embedded context was recreated, so the polyfill (if the transport
    /// has one) and the bootstrap are installed again. Calls the new page made
    /// before this signal stay queued and settle normally.
    pub async fn on_navigation_completed(&self) -> Result<(), BridgeError> {
        if self.is_disposed() {
            return Ok(());
        }

        let Some(transport) = self.inner.current_transport().await else {
            debug!(session = %self.inner.session_id, "Navigation completed while detached");
            return Ok(());
        };

        if let Some(polyfill) = transport.polyfill_script() {
            transport.deliver_to_embedded(&polyfill).await?;
        }
        transport.deliver_to_embedded(&self.inner.bootstrap).await?;
        debug!(session = %self.inner.session_id, "Bootstrap installed");
        Ok(())
    }

    /// Polyfill of the attached transport followed by the bootstrap, for
    /// hosts with a persistent on-load injection hook
    pub async fn injection_script(&self) -> String {
        let polyfill = self
            .inner
            .current_transport()
            .await
            .and_then(|transport| transport.polyfill_script());
        script::injection_script(polyfill, &self.inner.bootstrap)
    }

    fn inbound_sink(&self) -> InboundSink {
        let inner = Arc::downgrade(&self.inner);
        InboundSink::new(move |raw| {
            if let Some(inner) = inner.upgrade() {
                inner.handle_incoming(raw);
            }
        })
    }
}

impl std::fmt::Debug for NativeBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBridge")
            .field("session_id", &self.inner.session_id)
            .field("namespace", &self.inner.config.namespace)
            .field("attached", &self.is_attached())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl BridgeInner {
    async fn current_transport(&self) -> Option<Arc<dyn TransportAdapter>> {
        self.transport.read().await.clone()
    }

    fn accepting(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst) && self.attached.load(Ordering::SeqCst)
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_current(&self, generation: u64) -> bool {
        !self.disposed.load(Ordering::SeqCst) && self.current_generation() == generation
    }

    fn enqueue(&self, task: Task) {
        if self.queue.send(task).is_err() {
            debug!(session = %self.session_id, "Queue closed, dropping task");
        }
    }

    fn handle_incoming(&self, raw: String) {
        if !self.accepting() {
            debug!(session = %self.session_id, "Dropping inbound message while inactive");
            return;
        }
        self.enqueue(Task::Incoming {
            raw,
            generation: self.current_generation(),
        });
    }

    pub(crate) async fn process(&self, task: Task) {
        match task {
            Task::Incoming { raw, generation } => self.process_incoming(raw, generation).await,
            Task::Emit {
                event,
                payload,
                generation,
            } => {
                self.deliver(ScriptCall::trigger(event, payload), generation)
                    .await
            }
        }
    }

    async fn process_incoming(&self, raw: String, generation: u64) {
        if !self.is_current(generation) {
            return;
        }

        let request = match OutboundRequest::parse(&raw).map_err(|e| e.to_string()) {
            Ok(request) => request,
            Err(message) => {
                warn!(session = %self.session_id, error = %message, "Malformed envelope");
                if let Some(callback_id) = salvage_callback_id(&raw) {
                    self.deliver(ScriptCall::error(callback_id, &message), generation)
                        .await;
                }
                return;
            }
        };

        debug!(
            session = %self.session_id,
            method = %request.method,
            callback_id = ?request.callback_id,
            "Dispatching"
        );

        let outcome = if self.config.expose_method_list && request.method == METHOD_LIST {
            let names: Vec<String> = self
                .registry
                .methods()
                .into_iter()
                .map(|info| info.method)
                .collect();
            self.registry.codec().encode(&names)
        } else {
            self.registry
                .dispatch(&request.method, request.data.as_deref())
                .await
        };

        let Some(callback_id) = request.callback_id else {
            if let Err(err) = outcome {
                warn!(session = %self.session_id, method = %request.method, error = %err, "Fire-and-forget call failed");
            }
            return;
        };

        let call = match outcome {
            Ok(result) => ScriptCall::success(callback_id, result),
            Err(err) => {
                warn!(session = %self.session_id, method = %request.method, error = %err, "Call failed");
                ScriptCall::error(callback_id, &err.to_string())
            }
        };
        self.deliver(call, generation).await;
    }

    async fn deliver(&self, call: ScriptCall, generation: u64) {
        let transport = self.current_transport().await;
        if !self.is_current(generation) {
            debug!(session = %self.session_id, function = call.function(), "Discarding stale delivery");
            return;
        }
        let Some(transport) = transport else {
            return;
        };

        let script = call.to_script(&self.global);
        if let Err(err) = transport.deliver_to_embedded(&script).await {
            warn!(
                session = %self.session_id,
                function = call.function(),
                error = %err,
                "Delivery to embedded context failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_without_wire_format_fails() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();

        let err = NativeBridge::builder().build().unwrap_err();
        assert!(matches!(err, BridgeError::SerializerMisconfigured));
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = NativeBridge::new(BridgeConfig::default()).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let config = BridgeConfig {
            namespace: "1bad".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            NativeBridge::new(config),
            Err(BridgeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_fresh_bridge_state() {
        let bridge = NativeBridge::builder()
            .wire_format(JsonWire::new())
            .build()
            .unwrap();

        assert!(!bridge.is_attached());
        assert!(!bridge.is_disposed());
        assert_eq!(bridge.global(), "window.NativeBridge");
        assert!(bridge.bootstrap_script().contains("window.NativeBridge = {"));
        assert_eq!(bridge.codec().format_name(), "json");
    }

    #[tokio::test]
    async fn test_emit_while_detached_is_noop() {
        let bridge = NativeBridge::new(BridgeConfig::default()).unwrap();
        assert!(bridge.emit("tick", &1).is_ok());
        bridge.handle_incoming("{}");
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_blocks_attach() {
        let bridge = NativeBridge::new(BridgeConfig::default()).unwrap();
        bridge.dispose().await;
        bridge.dispose().await;
        assert!(bridge.is_disposed());

        let transport = Arc::new(crate::transport::UnsupportedTransport::new("NativeBridge").unwrap());
        assert!(matches!(
            bridge.attach(transport).await,
            Err(BridgeError::Disposed)
        ));
        assert!(bridge.on_navigation_completed().await.is_ok());
    }
}
