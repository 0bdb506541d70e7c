//! Cross-origin `postMessage` transport
//!
//! The embedded page posts `{type: <namespace>, payload: raw}` to its parent.
//! The host forwards each message event with its origin; messages from
//! origins outside the allow-list are dropped. Native → embedded delivery
//! may be blocked outright by the same-origin policy, in which case the
//! transport reports [`BridgeError::TransportUnavailable`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    InboundSink, InboundSlot, ScriptEvaluator, SurfaceError, TransportAdapter, TransportKind,
};
use crate::bridge::BridgeError;
use crate::script;

/// Message event data as posted by the polyfill
#[derive(Debug, Deserialize)]
struct MessageData {
    #[serde(rename = "type")]
    kind: String,
    payload: String,
}

pub struct PostMessageTransport {
    evaluator: Arc<dyn ScriptEvaluator>,
    inbound: InboundSlot,
    namespace: String,
    allowed_origins: Vec<String>,
    polyfill: String,
}

impl PostMessageTransport {
    pub fn new(
        evaluator: Arc<dyn ScriptEvaluator>,
        namespace: &str,
        allowed_origins: Vec<String>,
        target_origin: &str,
    ) -> Result<Self, BridgeError> {
        Ok(Self {
            evaluator,
            inbound: InboundSlot::default(),
            namespace: namespace.to_string(),
            allowed_origins,
            polyfill: script::render_post_message_polyfill(namespace, target_origin)?,
        })
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed.trim_end_matches('/') == origin.trim_end_matches('/'))
    }

    /// Entry point for the host's message event listener
    ///
    /// `data` is the event data serialized as JSON. Returns `Ok(false)` for
    /// messages that belong to someone else on the page.
    pub fn receive_message(&self, origin: &str, data: &str) -> Result<bool, BridgeError> {
        if !self.is_origin_allowed(origin) {
            warn!(origin = %origin, "Dropping message from disallowed origin");
            return Err(BridgeError::OriginRejected(origin.to_string()));
        }

        let message: MessageData = match serde_json::from_str(data) {
            Ok(message) => message,
            Err(_) => {
                debug!(origin = %origin, "Ignoring unrelated message");
                return Ok(false);
            }
        };
        if message.kind != self.namespace {
            return Ok(false);
        }

        self.send_from_embedded(&message.payload)?;
        Ok(true)
    }
}

#[async_trait]
impl TransportAdapter for PostMessageTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::PostMessage
    }

    fn bind(&self, inbound: Option<InboundSink>) {
        self.inbound.set(inbound);
    }

    fn send_from_embedded(&self, raw: &str) -> Result<(), BridgeError> {
        self.inbound.forward(raw)
    }

    async fn deliver_to_embedded(&self, script: &str) -> Result<(), BridgeError> {
        match self.evaluator.evaluate(script).await {
            Ok(()) => Ok(()),
            Err(SurfaceError::CrossOrigin(reason)) => {
                warn!(reason = %reason, "Embedded context unreachable across origins");
                Err(BridgeError::TransportUnavailable)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn polyfill_script(&self) -> Option<String> {
        Some(self.polyfill.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Blocked;

    #[async_trait]
    impl ScriptEvaluator for Blocked {
        async fn evaluate(&self, _script: &str) -> Result<(), SurfaceError> {
            Err(SurfaceError::CrossOrigin("https://other.example".to_string()))
        }
    }

    fn transport(origins: &[&str]) -> PostMessageTransport {
        PostMessageTransport::new(
            Arc::new(Blocked),
            "NativeBridge",
            origins.iter().map(|o| o.to_string()).collect(),
            "*",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_blocked_delivery_is_transport_unavailable() {
        let transport = transport(&["*"]);
        assert!(matches!(
            transport.deliver_to_embedded("x").await,
            Err(BridgeError::TransportUnavailable)
        ));
    }

    #[test]
    fn test_origin_allow_list() {
        let transport = transport(&["https://app.example/"]);
        assert!(transport.is_origin_allowed("https://app.example"));
        assert!(!transport.is_origin_allowed("https://evil.example"));
        assert!(matches!(
            transport.receive_message("https://evil.example", "{}"),
            Err(BridgeError::OriginRejected(_))
        ));
    }

    #[test]
    fn test_receive_message_unwraps_payload() {
        let transport = transport(&["*"]);
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        transport.bind(Some(InboundSink::new(move |raw| sink.lock().unwrap().push(raw))));

        let data = serde_json::json!({ "type": "NativeBridge", "payload": "{\"method\":\"ping\"}" });
        assert!(transport
            .receive_message("https://any.example", &data.to_string())
            .unwrap());

        let foreign = serde_json::json!({ "type": "analytics", "payload": "x" });
        assert!(!transport
            .receive_message("https://any.example", &foreign.to_string())
            .unwrap());
        assert!(!transport.receive_message("https://any.example", "42").unwrap());

        assert_eq!(
            *received.lock().unwrap(),
            vec!["{\"method\":\"ping\"}".to_string()]
        );
    }
}
