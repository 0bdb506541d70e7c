//! # Embed Bridge
//!
//! Bidirectional RPC between native host code and the script context of an
//! embedded browser surface, built on the only two primitives such surfaces
//! offer: "hand a string to native code" and "evaluate a script in the page".
//!
//! ## Features
//!
//! - **Typed handlers** - Register async or plain closures with `serde` input/output types
//! - **Request/response correlation** - Every embedded call settles exactly once
//! - **Event broadcast** - Fire-and-forget `emit` to embedded listeners
//! - **Idempotent lifecycle** - `attach`/`detach`/`dispose` and reinstall on navigation
//!
//! ## Transports
//!
//! - **Direct injection**: native object exposed straight into the page
//! - **Message router**: single query primitive adapted by a polyfill
//! - **Post message**: cross-origin `postMessage` channel
//! - **Unsupported**: fallback where every call settles with `Transport unavailable`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use embed_bridge::prelude::*;
//!
//! struct Surface;
//!
//! #[async_trait::async_trait]
//! impl ScriptEvaluator for Surface {
//!     async fn evaluate(&self, script: &str) -> Result<(), SurfaceError> {
//!         // hand the script to the web view
//!         let _ = script;
//!         Ok(())
//!     }
//! }
//!
//! #[derive(serde::Deserialize)]
//! struct Add {
//!     a: i64,
//!     b: i64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bridge = NativeBridge::new(BridgeConfig::default())?;
//!     bridge.register_sync("add", |input: Add| Ok(input.a + input.b));
//!
//!     let transport = Arc::new(DirectInjectionTransport::new(Arc::new(Surface)));
//!     bridge.attach(transport.clone()).await?;
//!     bridge.on_navigation_completed().await?;
//!
//!     // The page called window.NativeBridge.call("add", {a: 1, b: 2})
//!     transport.send_from_embedded(
//!         r#"{"method":"add","data":"{\"a\":1,\"b\":2}","callbackId":"cb_1"}"#,
//!     )?;
//!
//!     bridge.emit("tick", &1)?;
//!     bridge.dispose().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod embedded;
pub mod protocol;
pub mod registry;
pub mod script;
pub mod transport;

// Re-export main types
pub use bridge::{BridgeBuilder, BridgeError, NativeBridge, METHOD_LIST};
pub use codec::{Codec, JsonWire, WireFormat};
pub use config::{BridgeConfig, ConfigError, TransportConfig};
pub use embedded::{CallError, CallHandle, EmbeddedCorrelator, ListenerId};
pub use protocol::{OutboundRequest, ScriptCall};
pub use registry::{HandlerInfo, HandlerRegistry};
pub use transport::{
    DirectInjectionTransport, InboundSink, MessageRouterTransport, PostMessageTransport,
    ScriptEvaluator, SurfaceError, TransportAdapter, TransportKind, UnsupportedTransport,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{BridgeBuilder, BridgeError, NativeBridge};
    pub use crate::config::{BridgeConfig, TransportConfig};
    pub use crate::embedded::{CallError, EmbeddedCorrelator};
    pub use crate::transport::{
        DirectInjectionTransport, MessageRouterTransport, PostMessageTransport, ScriptEvaluator,
        SurfaceError, TransportAdapter, TransportKind, UnsupportedTransport,
    };
}
