//! Correlation table for in-flight requests.
//!
//! Each outbound request registers a slot keyed by correlation id before it
//! is published, so a reply can never race past its own registration. The
//! returned guard removes the slot on drop, which makes removal exactly once
//! on every exit path: reply delivered, timeout, publish failure, or panic
//! unwinding through the requester.

use super::payload::ReplyPayload;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Default)]
pub(super) struct PendingTable {
    inner: Mutex<HashMap<String, Sender<ReplyPayload>>>,
}

impl PendingTable {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a slot for `corr_id`. The guard keeps the slot alive; the
    /// receiver yields the reply if one arrives before the guard drops.
    pub(super) fn register(self: &Arc<Self>, corr_id: &str) -> (PendingGuard, Receiver<ReplyPayload>) {
        let (sender, receiver) = bounded(1);
        self.lock().insert(corr_id.to_string(), sender);
        (
            PendingGuard {
                table: Arc::clone(self),
                corr_id: corr_id.to_string(),
            },
            receiver,
        )
    }

    /// Route a reply to its waiting slot. Returns false when no slot exists,
    /// which covers late replies, duplicates, and foreign traffic.
    pub(super) fn deliver(&self, corr_id: &str, payload: ReplyPayload) -> bool {
        let guard = self.lock();
        match guard.get(corr_id) {
            Some(slot) => match slot.try_send(payload) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!(corr_id, "duplicate reply dropped");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Sender<ReplyPayload>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Removes the pending slot when dropped.
pub(super) struct PendingGuard {
    table: Arc<PendingTable>,
    corr_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.lock().remove(&self.corr_id);
    }
}
