// ── Channel value caches ──
//
// Last-write-wins maps from channel address to value, published as
// immutable snapshots through a `watch` channel. One merge is one
// notification, however many channels it touched.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

use crate::model::{ChannelAddress, ChannelSnapshot, ChannelValues};

pub(crate) struct ValueCache {
    snapshot: watch::Sender<ChannelSnapshot>,
}

impl ValueCache {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(ChannelValues::new()));
        Self { snapshot }
    }

    /// Apply a batch of values and publish once. Empty batches publish nothing.
    pub fn merge(&self, values: impl IntoIterator<Item = (ChannelAddress, Value)>) -> usize {
        let mut values = values.into_iter().peekable();
        if values.peek().is_none() {
            return 0;
        }

        let mut merged = ChannelValues::clone(&self.snapshot.borrow());
        let mut count = 0;
        for (address, value) in values {
            merged.insert(address, value);
            count += 1;
        }
        // `send_replace` updates unconditionally, even with zero receivers.
        self.snapshot.send_replace(Arc::new(merged));
        count
    }

    /// Drop every value. Publishes only if something was cached.
    pub fn clear(&self) {
        self.snapshot.send_if_modified(|snap| {
            if snap.is_empty() {
                false
            } else {
                *snap = Arc::new(ChannelValues::new());
                true
            }
        });
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.snapshot.subscribe()
    }
}
