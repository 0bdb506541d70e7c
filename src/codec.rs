//! Wire serialization for bridge payloads
//!
//! Typed values cross the bridge as JSON text. The [`Codec`] turns any
//! `serde` type into a wire string and back, while the byte-level format is
//! supplied by a [`WireFormat`] so hosts can swap it without touching
//! handler code.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::bridge::BridgeError;

/// Byte-level encoding of JSON values
pub trait WireFormat: Send + Sync + fmt::Debug {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    fn to_wire(&self, value: &Value) -> Result<String, serde_json::Error>;

    fn from_wire(&self, wire: &str) -> Result<Value, serde_json::Error>;
}

/// Plain JSON text, optionally pretty-printed
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonWire {
    pretty: bool,
}

impl JsonWire {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Multi-line output, handy when reading scripts in a devtools console
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl WireFormat for JsonWire {
    fn name(&self) -> &'static str {
        if self.pretty {
            "json-pretty"
        } else {
            "json"
        }
    }

    fn to_wire(&self, value: &Value) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
    }

    fn from_wire(&self, wire: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str(wire)
    }
}

/// Typed encode/decode on top of a [`WireFormat`]
#[derive(Debug, Clone)]
pub struct Codec {
    format: Arc<dyn WireFormat>,
}

impl Codec {
    pub fn new(format: impl WireFormat + 'static) -> Self {
        Self {
            format: Arc::new(format),
        }
    }

    pub fn from_shared(format: Arc<dyn WireFormat>) -> Self {
        Self { format }
    }

    pub fn json() -> Self {
        Self::new(JsonWire::new())
    }

    pub fn format_name(&self) -> &'static str {
        self.format.name()
    }

    /// Encode a value into its wire literal
    ///
    /// Record fields keep their declaration order.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, BridgeError> {
        let value = serde_json::to_value(value).map_err(|e| BridgeError::Encode {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })?;
        self.format.to_wire(&value).map_err(|e| BridgeError::Encode {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    /// Decode a wire literal into `T`
    ///
    /// `Option<T>` targets accept the literal `null` as `None`. Failures carry
    /// the offending wire text and the target type name.
    pub fn decode<T: DeserializeOwned>(&self, wire: &str) -> Result<T, BridgeError> {
        let value = self
            .format
            .from_wire(wire)
            .map_err(|e| decode_error::<T>(wire, e))?;
        serde_json::from_value(value).map_err(|e| decode_error::<T>(wire, e))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::json()
    }
}

fn decode_error<T>(wire: &str, err: serde_json::Error) -> BridgeError {
    BridgeError::Decode {
        wire: wire.to_string(),
        type_name: type_name::<T>(),
        reason: err.to_string(),
    }
}
