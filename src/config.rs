//! Bridge configuration
//!
//! Loaded from YAML by hosts that keep bridge settings next to the rest of
//! their surface configuration:
//!
//! ```yaml
//! namespace: NativeBridge
//! call_timeout_ms: 30000
//! expose_method_list: true
//!
//! transport:
//!   kind: message_router
//!   query_function: cefQuery
//! ```

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::transport::TransportKind;

static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

/// Reject anything that is not a plain script identifier; these names are
/// spliced into generated scripts verbatim.
pub(crate) fn check_identifier(field: &str, value: &str) -> Result<(), ConfigError> {
    if IDENTIFIER_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} '{}' is not a script identifier",
            field, value
        )))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Transport selection and its per-variant settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    #[default]
    DirectInjection,
    MessageRouter {
        #[serde(default = "default_query_function")]
        query_function: String,
    },
    PostMessage {
        #[serde(default = "default_allowed_origins")]
        allowed_origins: Vec<String>,
        #[serde(default = "default_target_origin")]
        target_origin: String,
    },
    Unsupported,
}

fn default_query_function() -> String {
    "cefQuery".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_target_origin() -> String {
    "*".to_string()
}

impl TransportConfig {
    pub fn default_router() -> Self {
        TransportConfig::MessageRouter {
            query_function: default_query_function(),
        }
    }

    pub fn default_post_message() -> Self {
        TransportConfig::PostMessage {
            allowed_origins: default_allowed_origins(),
            target_origin: default_target_origin(),
        }
    }

    /// Settings for `kind` with every field at its default
    pub fn for_kind(kind: TransportKind) -> Self {
        match kind {
            TransportKind::DirectInjection => TransportConfig::DirectInjection,
            TransportKind::MessageRouter => Self::default_router(),
            TransportKind::PostMessage => Self::default_post_message(),
            TransportKind::Unsupported => TransportConfig::Unsupported,
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::DirectInjection => TransportKind::DirectInjection,
            TransportConfig::MessageRouter { .. } => TransportKind::MessageRouter,
            TransportConfig::PostMessage { .. } => TransportKind::PostMessage,
            TransportConfig::Unsupported => TransportKind::Unsupported,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Name of the bridge global in the embedded context
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Caller-side timeout applied by the embedded script; unset keeps
    /// calls pending until the native side answers
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,

    /// Answer the built-in `__bridge.methods` call with the registered names
    #[serde(default)]
    pub expose_method_list: bool,

    /// Pretty-print wire literals
    #[serde(default)]
    pub pretty_wire: bool,
}

fn default_namespace() -> String {
    "NativeBridge".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            transport: TransportConfig::default(),
            call_timeout_ms: None,
            expose_method_list: false,
            pretty_wire: false,
        }
    }
}

impl BridgeConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml {
                file: path.display().to_string(),
                error: e,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_identifier("namespace", &self.namespace)?;

        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "call_timeout_ms must be greater than zero".to_string(),
            ));
        }

        match &self.transport {
            TransportConfig::MessageRouter { query_function } => {
                check_identifier("query_function", query_function)
            }
            TransportConfig::PostMessage {
                allowed_origins, ..
            } if allowed_origins.is_empty() => Err(ConfigError::Invalid(
                "post_message transport needs at least one allowed origin".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.namespace, "NativeBridge");
        assert_eq!(config.transport, TransportConfig::DirectInjection);
        assert_eq!(config.call_timeout_ms, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
namespace: AppBridge
call_timeout_ms: 5000
transport:
  kind: message_router
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.namespace, "AppBridge");
        assert_eq!(config.call_timeout_ms, Some(5000));
        assert_eq!(config.transport, TransportConfig::default_router());
        assert_eq!(config.transport.kind(), TransportKind::MessageRouter);
    }

    #[test]
    fn test_parse_post_message_config() {
        let yaml = r#"
transport:
  kind: post_message
  allowed_origins: ["https://app.example"]
"#;
        let config: BridgeConfig = serde_yaml::from_str(yaml).unwrap();
        match config.transport {
            TransportConfig::PostMessage {
                allowed_origins,
                target_origin,
            } => {
                assert_eq!(allowed_origins, vec!["https://app.example".to_string()]);
                assert_eq!(target_origin, "*");
            }
            other => panic!("unexpected transport: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_namespace() {
        let config = BridgeConfig {
            namespace: "not-valid".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_transport_settings() {
        let mut config = BridgeConfig {
            transport: TransportConfig::MessageRouter {
                query_function: "window.cefQuery".to_string(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.transport = TransportConfig::PostMessage {
            allowed_origins: vec![],
            target_origin: "*".to_string(),
        };
        assert!(config.validate().is_err());

        config.transport = TransportConfig::DirectInjection;
        config.call_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_for_kind_round_trips_kind() {
        for kind in TransportKind::ALL {
            assert_eq!(TransportConfig::for_kind(kind).kind(), kind);
        }
    }
}
