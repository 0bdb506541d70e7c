//! Transport adapters
//!
//! A transport is the only part of the bridge that knows how the host
//! surface moves strings around. Every variant realizes the same contract:
//! raw envelopes coming out of the embedded context are forwarded to the
//! bridge through an [`InboundSink`], and settlement/event scripts go back
//! in through the host's [`ScriptEvaluator`].
//!
//! - `direct`: native object injected straight into the script scope
//! - `router`: single query primitive adapted by a polyfill
//! - `post_message`: cross-origin `postMessage` channel
//! - `unsupported`: no-op fallback that rejects every call

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bridge::BridgeError;
use crate::config::{BridgeConfig, TransportConfig};

pub mod direct;
pub mod post_message;
pub mod router;
pub mod unsupported;

pub use direct::DirectInjectionTransport;
pub use post_message::PostMessageTransport;
pub use router::MessageRouterTransport;
pub use unsupported::UnsupportedTransport;

/// Failure reported by the host's script evaluation primitive
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("Surface is not attached")]
    Detached,

    #[error("Blocked by same-origin policy: {0}")]
    CrossOrigin(String),

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),
}

/// Host primitive that evaluates a script inside the embedded context
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(&self, script: &str) -> Result<(), SurfaceError>;
}

/// Route from a transport into its bridge's inbound queue
#[derive(Clone)]
pub struct InboundSink {
    route: Arc<dyn Fn(String) + Send + Sync>,
}

impl InboundSink {
    pub fn new(route: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            route: Arc::new(route),
        }
    }

    pub fn deliver(&self, raw: String) {
        (self.route)(raw)
    }
}

impl fmt::Debug for InboundSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InboundSink")
    }
}

/// Delivery mechanism implemented by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    DirectInjection,
    MessageRouter,
    PostMessage,
    Unsupported,
}

impl TransportKind {
    pub const ALL: [TransportKind; 4] = [
        TransportKind::DirectInjection,
        TransportKind::MessageRouter,
        TransportKind::PostMessage,
        TransportKind::Unsupported,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::DirectInjection => "direct_injection",
            TransportKind::MessageRouter => "message_router",
            TransportKind::PostMessage => "post_message",
            TransportKind::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        TransportKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown transport '{}', expected one of: {}",
                    s,
                    TransportKind::ALL.map(|k| k.as_str()).join(", ")
                )
            })
    }
}

/// Contract shared by every delivery mechanism
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Bind (or with `None`, unbind) the route into the bridge
    fn bind(&self, inbound: Option<InboundSink>);

    /// Raw envelope handed over by the embedded context
    fn send_from_embedded(&self, raw: &str) -> Result<(), BridgeError>;

    /// Evaluate `script` in the embedded context
    async fn deliver_to_embedded(&self, script: &str) -> Result<(), BridgeError>;

    /// Script adapting the host primitive to the bridge's
    /// `<namespace>Native.postMessage(raw)` entry point, if one is needed.
    /// Installed ahead of the bootstrap after every navigation.
    fn polyfill_script(&self) -> Option<String> {
        None
    }
}

/// Holds the bound inbound route for a transport
#[derive(Debug, Default)]
pub(crate) struct InboundSlot {
    sink: Mutex<Option<InboundSink>>,
}

impl InboundSlot {
    pub(crate) fn set(&self, inbound: Option<InboundSink>) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = inbound;
    }

    pub(crate) fn forward(&self, raw: &str) -> Result<(), BridgeError> {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match sink {
            Some(sink) => {
                sink.deliver(raw.to_string());
                Ok(())
            }
            None => Err(BridgeError::TransportUnavailable),
        }
    }
}

/// Build the transport selected by `config`
pub fn from_config(
    config: &BridgeConfig,
    evaluator: Arc<dyn ScriptEvaluator>,
) -> Result<Arc<dyn TransportAdapter>, BridgeError> {
    let namespace = config.namespace.as_str();
    let transport: Arc<dyn TransportAdapter> = match &config.transport {
        TransportConfig::DirectInjection => Arc::new(DirectInjectionTransport::new(evaluator)),
        TransportConfig::MessageRouter { query_function } => Arc::new(
            MessageRouterTransport::new(evaluator, namespace, query_function)?,
        ),
        TransportConfig::PostMessage {
            allowed_origins,
            target_origin,
        } => Arc::new(PostMessageTransport::new(
            evaluator,
            namespace,
            allowed_origins.clone(),
            target_origin,
        )?),
        TransportConfig::Unsupported => Arc::new(UnsupportedTransport::new(namespace)?),
    };
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parsing() {
        assert_eq!(
            "direct-injection".parse::<TransportKind>().unwrap(),
            TransportKind::DirectInjection
        );
        assert_eq!(
            "MESSAGE_ROUTER".parse::<TransportKind>().unwrap(),
            TransportKind::MessageRouter
        );
        let err = "carrier-pigeon".parse::<TransportKind>().unwrap_err();
        assert!(err.contains("post_message"));
    }

    #[test]
    fn test_transport_kind_display_matches_serde() {
        for kind in TransportKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_inbound_slot_forwards_only_when_bound() {
        let slot = InboundSlot::default();
        assert!(matches!(
            slot.forward("x"),
            Err(BridgeError::TransportUnavailable)
        ));

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = received.clone();
        slot.set(Some(InboundSink::new(move |raw| {
            sink_received.lock().unwrap().push(raw)
        })));
        slot.forward("hello").unwrap();
        assert_eq!(*received.lock().unwrap(), vec!["hello".to_string()]);

        slot.set(None);
        assert!(slot.forward("again").is_err());
    }

    #[test]
    fn test_from_config_selects_variant() {
        struct Noop;
        #[async_trait]
        impl ScriptEvaluator for Noop {
            async fn evaluate(&self, _script: &str) -> Result<(), SurfaceError> {
                Ok(())
            }
        }

        let evaluator: Arc<dyn ScriptEvaluator> = Arc::new(Noop);
        let mut config = BridgeConfig::default();
        for (transport, kind) in [
            (TransportConfig::DirectInjection, TransportKind::DirectInjection),
            (TransportConfig::default_router(), TransportKind::MessageRouter),
            (TransportConfig::default_post_message(), TransportKind::PostMessage),
            (TransportConfig::Unsupported, TransportKind::Unsupported),
        ] {
            config.transport = transport;
            let built = from_config(&config, evaluator.clone()).unwrap();
            assert_eq!(built.kind(), kind);
        }
    }
}
