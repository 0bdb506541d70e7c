//! Ordered task queue for one bridge
//!
//! Inbound requests and outbound events share one unbounded channel with a
//! single consumer, so handlers run one at a time in arrival order. Every
//! task records the attachment generation it was queued under; work that
//! outlives its attachment (detach, re-attach, navigation) is discarded.

use std::sync::Weak;

use tokio::sync::mpsc;

use super::native::BridgeInner;

#[derive(Debug)]
pub(crate) enum Task {
    /// Raw envelope received from the embedded side
    Incoming { raw: String, generation: u64 },
    /// Event with its already-encoded payload literal
    Emit {
        event: String,
        payload: String,
        generation: u64,
    },
}

pub(crate) type TaskSender = mpsc::UnboundedSender<Task>;

/// Spawn the consumer; it stops once the bridge is dropped or its queue
/// is aborted by `dispose`.
pub(crate) fn spawn_queue(
    handle: &tokio::runtime::Handle,
    inner: Weak<BridgeInner>,
    mut tasks: mpsc::UnboundedReceiver<Task>,
) -> tokio::task::JoinHandle<()> {
    handle.spawn(async move {
        while let Some(task) = tasks.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.process(task).await;
        }
    })
}
