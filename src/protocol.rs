//! Wire protocol shared by both sides of the bridge
//!
//! Embedded → native traffic is a JSON envelope:
//!
//! ```json
//! {"method": "add", "data": "{\"a\":1,\"b\":2}", "callbackId": "cb_1"}
//! ```
//!
//! Native → embedded traffic is a script calling into the bridge global:
//!
//! ```js
//! window.NativeBridge.onSuccess("cb_1", 3);
//! window.NativeBridge.onError("cb_2", "No handler found for method: ghost");
//! window.NativeBridge.trigger("tick", 7);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bridge::BridgeError;

/// Request sent by the embedded side through its one-way primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    pub method: String,
    #[serde(default)]
    pub data: Option<String>,
    /// `None` for fire-and-forget calls that expect no settlement
    #[serde(default)]
    pub callback_id: Option<String>,
}

impl OutboundRequest {
    pub fn call(
        method: impl Into<String>,
        data: Option<String>,
        callback_id: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            data,
            callback_id: Some(callback_id.into()),
        }
    }

    pub fn notify(method: impl Into<String>, data: Option<String>) -> Self {
        Self {
            method: method.into(),
            data,
            callback_id: None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(raw).map_err(|e| BridgeError::Decode {
            wire: raw.to_string(),
            type_name: "OutboundRequest",
            reason: e.to_string(),
        })
    }

    pub fn to_json(&self) -> String {
        // Two string fields and two optional strings cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn expects_reply(&self) -> bool {
        self.callback_id.is_some()
    }
}

/// Best-effort recovery of the callback id from an envelope that failed to
/// parse, so the caller still gets its rejection.
pub fn salvage_callback_id(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value
        .get("callbackId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// One native → embedded call, rendered as a script statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCall {
    /// Resolve a pending call; `result` is the raw wire literal
    OnSuccess { callback_id: String, result: String },
    /// Reject a pending call; `error` is a JSON string literal
    OnError { callback_id: String, error: String },
    /// Broadcast an event; `payload` is the raw wire literal
    Trigger { event: String, payload: String },
}

impl ScriptCall {
    pub fn success(callback_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::OnSuccess {
            callback_id: callback_id.into(),
            result: result.into(),
        }
    }

    pub fn error(callback_id: impl Into<String>, message: &str) -> Self {
        Self::OnError {
            callback_id: callback_id.into(),
            error: string_literal(message),
        }
    }

    pub fn trigger(event: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::Trigger {
            event: event.into(),
            payload: payload.into(),
        }
    }

    pub fn function(&self) -> &'static str {
        match self {
            Self::OnSuccess { .. } => "onSuccess",
            Self::OnError { .. } => "onError",
            Self::Trigger { .. } => "trigger",
        }
    }

    fn parts(&self) -> (&str, &str) {
        match self {
            Self::OnSuccess {
                callback_id,
                result,
            } => (callback_id, result),
            Self::OnError { callback_id, error } => (callback_id, error),
            Self::Trigger { event, payload } => (event, payload),
        }
    }

    /// Render as a statement against `global`, e.g. `window.NativeBridge`
    pub fn to_script(&self, global: &str) -> String {
        let (key, literal) = self.parts();
        format!(
            "{}.{}({}, {});",
            global,
            self.function(),
            string_literal(key),
            script_safe(literal)
        )
    }

    /// Parse a statement produced by [`ScriptCall::to_script`]
    pub fn parse(global: &str, script: &str) -> Result<Self, BridgeError> {
        let malformed = |reason: &str| BridgeError::Decode {
            wire: script.to_string(),
            type_name: "ScriptCall",
            reason: reason.to_string(),
        };

        let body = script.trim().trim_end_matches(';').trim_end();
        let call = body
            .strip_prefix(global)
            .and_then(|rest| rest.strip_prefix('.'))
            .ok_or_else(|| malformed("script does not target the bridge global"))?;

        let open = call.find('(').ok_or_else(|| malformed("missing '('"))?;
        let function = &call[..open];
        let args = call[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| malformed("missing ')'"))?;

        let mut stream = serde_json::Deserializer::from_str(args).into_iter::<String>();
        let key = match stream.next() {
            Some(Ok(key)) => key,
            _ => return Err(malformed("first argument is not a string literal")),
        };
        let literal = args[stream.byte_offset()..]
            .trim_start()
            .strip_prefix(',')
            .ok_or_else(|| malformed("missing second argument"))?
            .trim()
            .to_string();
        serde_json::from_str::<Value>(&literal)
            .map_err(|e| malformed(&format!("second argument is not a literal: {}", e)))?;

        match function {
            "onSuccess" => Ok(Self::OnSuccess {
                callback_id: key,
                result: literal,
            }),
            "onError" => Ok(Self::OnError {
                callback_id: key,
                error: literal,
            }),
            "trigger" => Ok(Self::Trigger {
                event: key,
                payload: literal,
            }),
            other => Err(malformed(&format!("unknown bridge function: {}", other))),
        }
    }
}

/// JSON string literal for `s`, safe to splice into a script
pub fn string_literal(s: &str) -> String {
    script_safe(&serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string()))
}

/// JSON allows raw U+2028/U+2029 inside strings; older script engines do not.
fn script_safe(literal: &str) -> String {
    if literal.contains(['\u{2028}', '\u{2029}']) {
        literal
            .replace('\u{2028}', "\\u2028")
            .replace('\u{2029}', "\\u2029")
    } else {
        literal.to_string()
    }
}
