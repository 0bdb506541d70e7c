//! Direct injection transport
//!
//! The host exposes a native object as `window.<namespace>Native` with a
//! `postMessage(raw)` method that calls straight into [`send_from_embedded`].
//! There is no synchronous return channel, so results still travel back as
//! asynchronously evaluated scripts.
//!
//! [`send_from_embedded`]: TransportAdapter::send_from_embedded

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{InboundSink, InboundSlot, ScriptEvaluator, TransportAdapter, TransportKind};
use crate::bridge::BridgeError;

pub struct DirectInjectionTransport {
    evaluator: Arc<dyn ScriptEvaluator>,
    inbound: InboundSlot,
}

impl DirectInjectionTransport {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self {
            evaluator,
            inbound: InboundSlot::default(),
        }
    }
}

#[async_trait]
impl TransportAdapter for DirectInjectionTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::DirectInjection
    }

    fn bind(&self, inbound: Option<InboundSink>) {
        self.inbound.set(inbound);
    }

    fn send_from_embedded(&self, raw: &str) -> Result<(), BridgeError> {
        self.inbound.forward(raw)
    }

    async fn deliver_to_embedded(&self, script: &str) -> Result<(), BridgeError> {
        debug!(bytes = script.len(), "Evaluating script in embedded context");
        self.evaluator.evaluate(script).await?;
        Ok(())
    }
}
