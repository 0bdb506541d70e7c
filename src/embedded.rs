//! Embedded-side correlator
//!
//! Native model of the state the bootstrap script keeps inside the embedded
//! context: pending calls keyed by callback id, and ordered event listeners.
//! Hosts that drive a script context from Rust, and simulated surfaces in
//! tests, use it to play the embedded half of the protocol.
//!
//! Every call moves `Idle → Sent(id) → Resolved | Rejected`. There is no
//! timeout transition of its own; [`EmbeddedCorrelator::expire`] is the hook
//! for callers that want one.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::bridge::BridgeError;
use crate::protocol::{OutboundRequest, ScriptCall};

/// Why an embedded call did not resolve
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// Settled through `onError`, or the send itself failed
    #[error("{0}")]
    Rejected(String),

    #[error("Call timed out: {0}")]
    TimedOut(String),

    #[error("Call dropped before settlement")]
    Dropped,
}

/// Identifies a listener registered with [`EmbeddedCorrelator::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&Value) + Send + Sync>;
type Sender = Box<dyn Fn(String) -> Result<(), BridgeError> + Send + Sync>;

struct PendingCall {
    method: String,
    reply: oneshot::Sender<Result<Value, CallError>>,
}

/// Future for the result of [`EmbeddedCorrelator::call`]
#[derive(Debug)]
pub struct CallHandle {
    id: String,
    reply: oneshot::Receiver<Result<Value, CallError>>,
}

impl CallHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for CallHandle {
    type Output = Result<Value, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.reply)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(CallError::Dropped)))
    }
}

pub struct EmbeddedCorrelator {
    global: String,
    send: Sender,
    pending: HashMap<String, PendingCall>,
    listeners: HashMap<String, Vec<(ListenerId, Listener)>>,
    counter: u64,
    next_listener: u64,
}

impl EmbeddedCorrelator {
    /// `send` is the one-way native-bound primitive; `global` is the bridge
    /// global the native side addresses, e.g. `window.NativeBridge`
    pub fn new(
        global: impl Into<String>,
        send: impl Fn(String) -> Result<(), BridgeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            global: global.into(),
            send: Box::new(send),
            pending: HashMap::new(),
            listeners: HashMap::new(),
            counter: 0,
            next_listener: 0,
        }
    }

    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("cb_{}", self.counter)
    }

    /// Issue a call; the handle settles on the matching `onSuccess`/`onError`
    ///
    /// A send failure rejects the call straight away.
    pub fn call(&mut self, method: &str, data: Option<String>) -> CallHandle {
        let id = self.next_id();
        let (reply, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingCall {
                method: method.to_string(),
                reply,
            },
        );

        let request = OutboundRequest::call(method, data, id.clone());
        if let Err(err) = (self.send)(request.to_json()) {
            self.settle(&id, Err(CallError::Rejected(err.to_string())));
        }

        CallHandle { id, reply: rx }
    }

    /// [`call`](Self::call) with `data` JSON-encoded first
    pub fn call_with<T: Serialize + ?Sized>(&mut self, method: &str, data: &T) -> CallHandle {
        match serde_json::to_string(data) {
            Ok(encoded) => self.call(method, Some(encoded)),
            Err(err) => {
                let (reply, rx) = oneshot::channel();
                let _ = reply.send(Err(CallError::Rejected(err.to_string())));
                CallHandle {
                    id: String::new(),
                    reply: rx,
                }
            }
        }
    }

    /// Fire-and-forget call; no callback id, no settlement
    pub fn notify(&mut self, method: &str, data: Option<String>) -> Result<(), BridgeError> {
        (self.send)(OutboundRequest::notify(method, data).to_json())
    }

    pub fn on(&mut self, event: &str, listener: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    pub fn off(&mut self, event: &str, listener: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != listener);
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(event);
        }
        removed
    }

    /// Invoke the listeners currently registered for `event`, in order.
    /// With none registered the event is simply lost.
    pub fn trigger(&self, event: &str, payload: &str) {
        let Some(list) = self.listeners.get(event) else {
            debug!(event = %event, "Event with no listeners");
            return;
        };
        let value = serde_json::from_str(payload).unwrap_or_else(|_| Value::String(payload.to_string()));
        for (_, listener) in list {
            listener(&value);
        }
    }

    /// Resolve the call `id` with a raw result literal; unknown ids are ignored
    pub fn on_success(&mut self, id: &str, result: &str) {
        let outcome = serde_json::from_str(result)
            .map_err(|e| CallError::Rejected(format!("Malformed result literal: {}", e)));
        self.settle(id, outcome);
    }

    /// Reject the call `id` with an error literal; unknown ids are ignored
    pub fn on_error(&mut self, id: &str, error: &str) {
        let message = serde_json::from_str::<String>(error).unwrap_or_else(|_| error.to_string());
        self.settle(id, Err(CallError::Rejected(message)));
    }

    /// Reject the call `id` as timed out, if it is still pending
    pub fn expire(&mut self, id: &str) -> bool {
        let Some(method) = self.pending.get(id).map(|p| p.method.clone()) else {
            return false;
        };
        self.settle(id, Err(CallError::TimedOut(method)))
    }

    fn settle(&mut self, id: &str, outcome: Result<Value, CallError>) -> bool {
        match self.pending.remove(id) {
            Some(pending) => {
                // The caller may have stopped waiting; that is fine
                let _ = pending.reply.send(outcome);
                true
            }
            None => {
                debug!(callback_id = %id, "Ignoring settlement for unknown call");
                false
            }
        }
    }

    /// Run a native-issued script against this correlator
    pub fn evaluate(&mut self, script: &str) -> Result<(), BridgeError> {
        match ScriptCall::parse(&self.global, script)? {
            ScriptCall::OnSuccess {
                callback_id,
                result,
            } => self.on_success(&callback_id, &result),
            ScriptCall::OnError { callback_id, error } => self.on_error(&callback_id, &error),
            ScriptCall::Trigger { event, payload } => self.trigger(&event, &payload),
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Drop every pending call; their handles resolve to [`CallError::Dropped`]
    pub fn dispose(&mut self) {
        self.pending.clear();
        self.listeners.clear();
    }
}

impl std::fmt::Debug for EmbeddedCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedCorrelator")
            .field("global", &self.global)
            .field("pending", &self.pending.len())
            .field("events", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}
