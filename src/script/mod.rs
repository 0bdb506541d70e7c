//! Scripts installed into the embedded context
//!
//! The bootstrap script realizes the embedded half of the protocol: it keeps
//! pending calls by callback id, exposes `call`/`notify`/`on`/`off`, and
//! receives `onSuccess`/`onError`/`trigger` from the native side. Polyfills
//! adapt a host primitive onto the `<namespace>Native.postMessage(raw)` entry
//! point the bootstrap sends through.
//!
//! Both kinds of script guard against double installation, so reinstalling
//! after a reload race is harmless.
//!
//! `trigger` calls listeners in registration order on a snapshot of the
//! list. A listener that throws is reported through `console.error` and the
//! remaining listeners still run.
//!
//! Namespaces and query function names are spliced into the scripts as-is,
//! so every renderer rejects anything that is not a plain script identifier.

use handlebars::Handlebars;
use serde_json::json;

use crate::bridge::BridgeError;
use crate::config::{check_identifier, BridgeConfig, TransportConfig};
use crate::protocol::string_literal;

const BOOTSTRAP_TEMPLATE: &str = include_str!("bridge.js");
const ROUTER_POLYFILL_TEMPLATE: &str = include_str!("polyfill_router.js");
const POST_MESSAGE_POLYFILL_TEMPLATE: &str = include_str!("polyfill_post_message.js");
const UNSUPPORTED_POLYFILL_TEMPLATE: &str = include_str!("polyfill_unsupported.js");

/// Expression naming the bridge global for `namespace`
pub fn global_expression(namespace: &str) -> String {
    format!("window.{}", namespace)
}

/// Name of the DOM event fired once the bootstrap is installed
pub fn ready_event(namespace: &str) -> String {
    format!("{}Ready", namespace)
}

/// Render the bootstrap script
///
/// `call_timeout_ms` enables the caller-side timeout; `None` keeps calls
/// pending until settled.
pub fn render_bootstrap(namespace: &str, call_timeout_ms: Option<u64>) -> Result<String, BridgeError> {
    check_identifier("namespace", namespace)?;
    let timeout = call_timeout_ms
        .map(|ms| ms.to_string())
        .unwrap_or_else(|| "null".to_string());
    render(
        BOOTSTRAP_TEMPLATE,
        &json!({ "namespace": namespace, "timeout_ms": timeout }),
    )
}

pub fn render_router_polyfill(namespace: &str, query_function: &str) -> Result<String, BridgeError> {
    check_identifier("namespace", namespace)?;
    check_identifier("query_function", query_function)?;
    render(
        ROUTER_POLYFILL_TEMPLATE,
        &json!({ "namespace": namespace, "query_function": query_function }),
    )
}

pub fn render_post_message_polyfill(namespace: &str, target_origin: &str) -> Result<String, BridgeError> {
    check_identifier("namespace", namespace)?;
    render(
        POST_MESSAGE_POLYFILL_TEMPLATE,
        &json!({ "namespace": namespace, "target_origin": string_literal(target_origin) }),
    )
}

pub fn render_unsupported_polyfill(namespace: &str) -> Result<String, BridgeError> {
    check_identifier("namespace", namespace)?;
    render(UNSUPPORTED_POLYFILL_TEMPLATE, &json!({ "namespace": namespace }))
}

/// Polyfill the configured transport needs, if any
pub fn render_polyfill(namespace: &str, transport: &TransportConfig) -> Result<Option<String>, BridgeError> {
    let polyfill = match transport {
        TransportConfig::DirectInjection => None,
        TransportConfig::MessageRouter { query_function } => {
            Some(render_router_polyfill(namespace, query_function)?)
        }
        TransportConfig::PostMessage { target_origin, .. } => {
            Some(render_post_message_polyfill(namespace, target_origin)?)
        }
        TransportConfig::Unsupported => Some(render_unsupported_polyfill(namespace)?),
    };
    Ok(polyfill)
}

/// Everything a host with a persistent on-load hook injects for `config`:
/// the transport polyfill followed by the bootstrap
pub fn render_injection(config: &BridgeConfig) -> Result<String, BridgeError> {
    let polyfill = render_polyfill(&config.namespace, &config.transport)?;
    let bootstrap = render_bootstrap(&config.namespace, config.call_timeout_ms)?;
    Ok(injection_script(polyfill, &bootstrap))
}

/// Join an optional polyfill and the bootstrap into one script
pub fn injection_script(polyfill: Option<String>, bootstrap: &str) -> String {
    match polyfill {
        Some(polyfill) => format!("{}\n{}", polyfill, bootstrap),
        None => bootstrap.to_string(),
    }
}

fn render(template: &str, data: &serde_json::Value) -> Result<String, BridgeError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);
    Ok(handlebars.render_template(template, data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_is_guarded_and_namespaced() {
        let script = render_bootstrap("NativeBridge", None).unwrap();

        assert!(script.contains("if (window.NativeBridge) {"));
        assert!(script.contains("window.NativeBridge = {"));
        assert!(script.contains("window.NativeBridgeNative"));
        assert!(script.contains("new CustomEvent(\"NativeBridgeReady\")"));
        assert!(script.contains("var timeoutMs = null;"));
        assert!(!script.contains("{{"));
    }

    #[test]
    fn test_bootstrap_timeout_hook() {
        let script = render_bootstrap("Bridge", Some(2500)).unwrap();
        assert!(script.contains("var timeoutMs = 2500;"));
    }

    #[test]
    fn test_bootstrap_exposes_protocol_functions() {
        let script = render_bootstrap("NativeBridge", None).unwrap();
        for function in ["call:", "notify:", "on:", "off:", "trigger:", "onSuccess:", "onError:"] {
            assert!(script.contains(function), "missing {function}");
        }
    }

    #[test]
    fn test_router_polyfill_uses_query_function() {
        let script = render_router_polyfill("NativeBridge", "cefQuery").unwrap();
        assert!(script.contains("if (window.NativeBridgeNative) {"));
        assert!(script.contains("window.cefQuery({"));
        assert!(script.contains("request: raw"));
    }

    #[test]
    fn test_post_message_polyfill_quotes_origin() {
        let script = render_post_message_polyfill("NativeBridge", "https://host.example").unwrap();
        assert!(script.contains("{ type: \"NativeBridge\", payload: raw }, \"https://host.example\")"));
    }

    #[test]
    fn test_unsupported_polyfill_rejects_calls() {
        let script = render_unsupported_polyfill("NativeBridge").unwrap();
        assert!(script.contains(
            "window.NativeBridge.onError(request.callbackId, \"Transport unavailable\")"
        ));
    }

    #[test]
    fn test_trigger_isolates_throwing_listeners() {
        let script = render_bootstrap("NativeBridge", None).unwrap();
        let start = script.find("trigger:").unwrap();
        let end = script.find("onSuccess:").unwrap();
        let trigger = &script[start..end];

        assert!(trigger.contains("list.slice().forEach"));
        assert!(trigger.contains("try {"));
        assert!(trigger.contains("console.error(\"NativeBridge listener for \""));
    }

    #[test]
    fn test_renderers_reject_non_identifiers() {
        for result in [
            render_bootstrap("Native-Bridge", None),
            render_router_polyfill("NativeBridge", "x;alert(1)//"),
            render_router_polyfill("x=1;NativeBridge", "cefQuery"),
            render_post_message_polyfill("a.b", "*"),
            render_unsupported_polyfill("NativeBridge()"),
        ] {
            assert!(matches!(result, Err(BridgeError::Config(_))));
        }
    }

    #[test]
    fn test_post_message_origin_is_always_a_literal() {
        let script = render_post_message_polyfill("NativeBridge", "\"); alert(1); (\"").unwrap();
        assert!(script.contains(r#"payload: raw }, "\"); alert(1); (\"")"#));
    }

    #[test]
    fn test_injection_places_polyfill_first() {
        let config = BridgeConfig {
            namespace: "AppBridge".to_string(),
            transport: TransportConfig::default_router(),
            ..Default::default()
        };
        let script = render_injection(&config).unwrap();

        let polyfill = script.find("window.AppBridgeNative = {").unwrap();
        let bootstrap = script.find("window.AppBridge = {").unwrap();
        assert!(polyfill < bootstrap);
        assert!(script.contains("window.cefQuery({"));
    }

    #[test]
    fn test_injection_without_polyfill_is_bootstrap() {
        let config = BridgeConfig::default();
        assert_eq!(
            render_injection(&config).unwrap(),
            render_bootstrap("NativeBridge", None).unwrap()
        );
        assert_eq!(
            render_polyfill("NativeBridge", &TransportConfig::DirectInjection).unwrap(),
            None
        );
    }

    #[test]
    fn test_global_and_ready_names() {
        assert_eq!(global_expression("Hub"), "window.Hub");
        assert_eq!(ready_event("Hub"), "HubReady");
    }
}
