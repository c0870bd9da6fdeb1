// ── Reactive channel streams ──
//
// What a consumer holds after subscribing: point-in-time access to the
// values of its batch key plus change notification.

use std::collections::BTreeSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{ChannelAddress, ChannelSnapshot};

/// A subscription's view of one value cache.
///
/// The cache is shared by every consumer of the same batch key, so a
/// snapshot may contain channels other consumers asked for. Use
/// [`value`](Self::value) or [`selected`](Self::selected) to read only
/// your own.
pub struct ChannelStream {
    channels: Arc<BTreeSet<ChannelAddress>>,
    current: ChannelSnapshot,
    receiver: watch::Receiver<ChannelSnapshot>,
}

impl ChannelStream {
    pub(crate) fn new(
        channels: BTreeSet<ChannelAddress>,
        mut receiver: watch::Receiver<ChannelSnapshot>,
    ) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self {
            channels: Arc::new(channels),
            current,
            receiver,
        }
    }

    /// The channels this subscription asked for.
    pub fn channels(&self) -> &BTreeSet<ChannelAddress> {
        &self.channels
    }

    /// Get the snapshot captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> &ChannelSnapshot {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> ChannelSnapshot {
        self.receiver.borrow().clone()
    }

    /// Latest value of one channel.
    pub fn value(&self, address: &ChannelAddress) -> Option<Value> {
        self.receiver.borrow().get(address).cloned()
    }

    /// Latest values restricted to this subscription's channels.
    pub fn selected(&self) -> Vec<(ChannelAddress, Option<Value>)> {
        let snapshot = self.latest();
        self.channels
            .iter()
            .map(|address| (address.clone(), snapshot.get(address).cloned()))
            .collect()
    }

    /// Wait for the next change, returning the new snapshot.
    /// Returns `None` if the session has been dropped.
    pub async fn changed(&mut self) -> Option<ChannelSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    ///
    /// The stream yields the current snapshot first.
    pub fn into_stream(self) -> ChannelWatchStream {
        ChannelWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct ChannelWatchStream {
    inner: WatchStream<ChannelSnapshot>,
}

impl Stream for ChannelWatchStream {
    type Item = ChannelSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
