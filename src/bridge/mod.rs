//! Native side of the bridge
//!
//! This module provides the bridge core and its error type:
//! - `native`: the [`NativeBridge`] object, its builder and lifecycle
//! - `queue`: the ordered task queue that serializes handler execution

mod native;
mod queue;

pub use native::{BridgeBuilder, NativeBridge, METHOD_LIST};

use crate::config::ConfigError;
use crate::transport::SurfaceError;

/// Common error type for bridge operations
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to decode {type_name} from {wire}: {reason}")]
    Decode {
        wire: String,
        type_name: &'static str,
        reason: String,
    },

    #[error("Failed to encode {type_name}: {reason}")]
    Encode {
        type_name: &'static str,
        reason: String,
    },

    #[error("No handler found for method: {0}")]
    HandlerNotFound(String),

    #[error("{0}")]
    HandlerThrew(String),

    #[error("Transport unavailable")]
    TransportUnavailable,

    #[error("No serializer configured for the bridge")]
    SerializerMisconfigured,

    #[error("Message from disallowed origin: {0}")]
    OriginRejected(String),

    #[error("Bridge has been disposed")]
    Disposed,

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Template error: {0}")]
    Template(#[from] handlebars::RenderError),
}
