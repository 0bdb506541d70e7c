//! Fallback for hosts without any usable delivery mechanism
//!
//! Registration on the bridge still succeeds. The polyfill makes every
//! embedded call settle at once with `Transport unavailable`, and native
//! deliveries report [`BridgeError::TransportUnavailable`].

use async_trait::async_trait;

use super::{InboundSink, TransportAdapter, TransportKind};
use crate::bridge::BridgeError;
use crate::script;

pub struct UnsupportedTransport {
    polyfill: String,
}

impl UnsupportedTransport {
    pub fn new(namespace: &str) -> Result<Self, BridgeError> {
        Ok(Self {
            polyfill: script::render_unsupported_polyfill(namespace)?,
        })
    }
}

#[async_trait]
impl TransportAdapter for UnsupportedTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Unsupported
    }

    fn bind(&self, _inbound: Option<InboundSink>) {}

    fn send_from_embedded(&self, _raw: &str) -> Result<(), BridgeError> {
        Err(BridgeError::TransportUnavailable)
    }

    async fn deliver_to_embedded(&self, _script: &str) -> Result<(), BridgeError> {
        Err(BridgeError::TransportUnavailable)
    }

    fn polyfill_script(&self) -> Option<String> {
        Some(self.polyfill.clone())
    }
}
