//! Latest-wins persistence queue for full-order payloads.
//!
//! Each queue holds at most one pending payload per group and an in-flight
//! flag. Submitting overwrites the pending payload of the same group; a
//! single drain task sends pending payloads in submission order until none
//! are left. A failed send is never retried: everything still pending is
//! discarded, the sink's [`ReorderSink::recover`] reloads authoritative
//! state instead, and the next user action produces a fresh payload.

use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::api::ClientError;

/// A desired full order for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPayload<G> {
    /// The group being reordered.
    pub group: G,
    /// All member ids, top first.
    pub ordered_ids: Vec<i64>,
}

/// Where a queue delivers its payloads.
pub trait ReorderSink: Send + Sync + 'static {
    /// The ordering scope.
    type Group: Clone + Debug + PartialEq + Send + Sync + 'static;

    /// Sends one payload to the server.
    fn send(
        &self,
        payload: &ReorderPayload<Self::Group>,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Called once per failed send. Expected to reload `group` and every
    /// group in `discarded` (payloads dropped unsent) from the server and
    /// surface the error.
    fn recover(
        &self,
        group: &Self::Group,
        discarded: &[Self::Group],
        error: ClientError,
    ) -> impl Future<Output = ()> + Send;
}

struct Slot<G> {
    /// Latest unsent payload per group, oldest group first.
    pending: Vec<ReorderPayload<G>>,
    in_flight: bool,
}

struct Shared<S: ReorderSink> {
    sink: S,
    slot: Mutex<Slot<S::Group>>,
    idle: Notify,
    debounce: Duration,
    sent: AtomicUsize,
    failed: AtomicUsize,
    coalesced: AtomicUsize,
}

/// Latest-wins reorder queue with one slot per group.
///
/// Cloning yields another handle to the same queue.
pub struct ReorderQueue<S: ReorderSink> {
    shared: Arc<Shared<S>>,
}

impl<S: ReorderSink> Clone for ReorderQueue<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: ReorderSink> ReorderQueue<S> {
    /// Creates a queue. With a non-zero `debounce` the drain task waits that
    /// long before taking each payload, so bursts collapse further.
    #[must_use]
    pub fn new(sink: S, debounce: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                sink,
                slot: Mutex::new(Slot {
                    pending: Vec::new(),
                    in_flight: false,
                }),
                idle: Notify::new(),
                debounce,
                sent: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                coalesced: AtomicUsize::new(0),
            }),
        }
    }

    /// The wrapped sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.shared.sink
    }

    /// Queues a full order for `group`, replacing any unsent payload of the
    /// same group.
    ///
    /// An empty list is ignored. Must be called from within a Tokio runtime.
    pub fn submit(&self, group: S::Group, ordered_ids: Vec<i64>) {
        if ordered_ids.is_empty() {
            return;
        }
        let mut slot = self.shared.slot.lock();
        if let Some(stale) = slot.pending.iter_mut().find(|p| p.group == group) {
            stale.ordered_ids = ordered_ids;
            self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(?group, "replaced unsent reorder payload");
        } else {
            slot.pending.push(ReorderPayload { group, ordered_ids });
        }
        if slot.in_flight {
            return;
        }
        slot.in_flight = true;
        drop(slot);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.drain().await });
    }

    /// Whether a payload is waiting or being sent.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        let slot = self.shared.slot.lock();
        slot.in_flight || !slot.pending.is_empty()
    }

    /// Resolves once nothing is pending or in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_busy() {
                return;
            }
            notified.await;
        }
    }

    /// Payloads delivered successfully.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.shared.sent.load(Ordering::Relaxed)
    }

    /// Payloads whose send failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// Payloads overwritten or discarded before they were sent.
    #[must_use]
    pub fn coalesced(&self) -> usize {
        self.shared.coalesced.load(Ordering::Relaxed)
    }
}

impl<S: ReorderSink> Shared<S> {
    async fn drain(&self) {
        loop {
            if !self.debounce.is_zero() {
                tokio::time::sleep(self.debounce).await;
            }
            let payload = {
                let mut slot = self.slot.lock();
                if slot.pending.is_empty() {
                    slot.in_flight = false;
                    drop(slot);
                    self.idle.notify_waiters();
                    return;
                }
                slot.pending.remove(0)
            };

            match self.sink.send(&payload).await {
                Ok(()) => {
                    self.sent.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        group = ?payload.group,
                        count = payload.ordered_ids.len(),
                        "reorder persisted"
                    );
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    // Pending payloads were computed against the optimistic
                    // state the reload is about to replace.
                    let discarded: Vec<S::Group> = std::mem::take(&mut self.slot.lock().pending)
                        .into_iter()
                        .map(|p| p.group)
                        .collect();
                    self.coalesced.fetch_add(discarded.len(), Ordering::Relaxed);
                    tracing::warn!(
                        group = ?payload.group,
                        discarded = discarded.len(),
                        error = %e,
                        "reorder failed, reloading"
                    );
                    self.sink.recover(&payload.group, &discarded, e).await;
                }
            }
        }
    }
}
