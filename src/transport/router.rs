//! Single-primitive message router transport
//!
//! Some hosts only let page scripts call one opaque query function (for
//! example `window.cefQuery`) which acknowledges synchronously and carries
//! no reply payload. A polyfill maps `<namespace>Native.postMessage(raw)`
//! onto that function. Page globals are wiped on reload and these hosts have
//! no persistent on-load injection, so the polyfill goes back in after every
//! navigation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{InboundSink, InboundSlot, ScriptEvaluator, TransportAdapter, TransportKind};
use crate::bridge::BridgeError;
use crate::script;

pub struct MessageRouterTransport {
    evaluator: Arc<dyn ScriptEvaluator>,
    inbound: InboundSlot,
    query_function: String,
    polyfill: String,
}

impl MessageRouterTransport {
    pub fn new(
        evaluator: Arc<dyn ScriptEvaluator>,
        namespace: &str,
        query_function: &str,
    ) -> Result<Self, BridgeError> {
        Ok(Self {
            evaluator,
            inbound: InboundSlot::default(),
            query_function: query_function.to_string(),
            polyfill: script::render_router_polyfill(namespace, query_function)?,
        })
    }

    pub fn query_function(&self) -> &str {
        &self.query_function
    }

    /// Entry point for the host's query handler
    ///
    /// Returns the acknowledgement the primitive hands back to the page; the
    /// real answer arrives later as a settlement script.
    pub fn on_query(&self, request: &str) -> bool {
        match self.send_from_embedded(request) {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "Query arrived while unbound");
                false
            }
        }
    }
}

#[async_trait]
impl TransportAdapter for MessageRouterTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::MessageRouter
    }

    fn bind(&self, inbound: Option<InboundSink>) {
        self.inbound.set(inbound);
    }

    fn send_from_embedded(&self, raw: &str) -> Result<(), BridgeError> {
        self.inbound.forward(raw)
    }

    async fn deliver_to_embedded(&self, script: &str) -> Result<(), BridgeError> {
        self.evaluator.evaluate(script).await?;
        Ok(())
    }

    fn polyfill_script(&self) -> Option<String> {
        Some(self.polyfill.clone())
    }
}
