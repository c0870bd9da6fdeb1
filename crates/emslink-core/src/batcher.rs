// ── Channel subscription batching ──
//
// Consumers register demand for channels independently. Demand is
// reference-counted per batch key and coalesced: the first change in a
// quiet period arms a debounce timer, and when it fires the whole demand
// set goes out as one query. Results land in one value cache per key.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::future::{pending, poll_fn};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::debug;

use crate::config::SessionConfig;
use crate::model::{ChannelAddress, DateRange};
use crate::store::ValueCache;
use crate::stream::ChannelStream;

// ── Keys and consumers ───────────────────────────────────────────────

/// What a subscription is for: live values or one historical range.
///
/// Each key has its own demand, debounce timer and value cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BatchKey {
    Live,
    Range(DateRange),
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => f.write_str("live"),
            Self::Range(range) => write!(f, "range {range}"),
        }
    }
}

/// Identifies one consumer (a widget, a CLI command) across calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(Arc<str>);

impl ConsumerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for ConsumerId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

// ── Batches ──────────────────────────────────────────────────────────

/// One outgoing query: the full demand of a key at fire time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Batch {
    pub key: BatchKey,
    pub generation: u64,
    /// Sorted, deduplicated.
    pub channels: Vec<ChannelAddress>,
}

impl Batch {
    pub fn channel_strings(&self) -> Vec<String> {
        self.channels.iter().map(ToString::to_string).collect()
    }
}

#[derive(Default)]
struct KeyState {
    /// Channel → number of consumers holding it. Entries never reach zero;
    /// they are removed instead.
    demand: BTreeMap<ChannelAddress, usize>,
    /// What each consumer holds. A set, so repeated subscribes count once.
    consumers: HashMap<ConsumerId, BTreeSet<ChannelAddress>>,
    timer: Option<delay_queue::Key>,
    /// Bumped on every fired batch; responses carrying an older one are stale.
    generation: u64,
}

// ── Batcher ──────────────────────────────────────────────────────────

pub(crate) struct Batcher {
    window: Duration,
    keys: HashMap<BatchKey, KeyState>,
    timers: DelayQueue<BatchKey>,
    live: Arc<ValueCache>,
    ranges: HashMap<DateRange, ValueCache>,
}

impl Batcher {
    pub fn new(window: Duration, live: Arc<ValueCache>) -> Self {
        Self {
            window: window.min(SessionConfig::MAX_TIMER),
            keys: HashMap::new(),
            timers: DelayQueue::new(),
            live,
            ranges: HashMap::new(),
        }
    }

    // ── Demand ───────────────────────────────────────────────────────

    /// Add `channels` to `consumer`'s demand under `key` and arm the
    /// key's debounce timer unless one is already pending.
    pub fn subscribe(
        &mut self,
        consumer: ConsumerId,
        key: BatchKey,
        channels: BTreeSet<ChannelAddress>,
    ) -> ChannelStream {
        let state = self.keys.entry(key).or_default();
        let held = state.consumers.entry(consumer.clone()).or_default();
        let mut added = 0;
        for channel in &channels {
            if held.insert(channel.clone()) {
                *state.demand.entry(channel.clone()).or_insert(0) += 1;
                added += 1;
            }
        }
        if state.timer.is_none() {
            state.timer = Some(self.timers.insert(key, self.window));
        }
        debug!(%consumer, %key, added, demand = state.demand.len(), "subscribed");

        let receiver = match key {
            BatchKey::Live => self.live.subscribe(),
            BatchKey::Range(range) => self.ranges.entry(range).or_insert_with(ValueCache::new).subscribe(),
        };
        ChannelStream::new(channels, receiver)
    }

    /// Remove channels from a consumer's demand. Never issues a query.
    pub fn unsubscribe(&mut self, consumer: &ConsumerId, key: BatchKey, channels: &BTreeSet<ChannelAddress>) {
        let Some(state) = self.keys.get_mut(&key) else {
            return;
        };
        let Some(held) = state.consumers.get_mut(consumer) else {
            return;
        };

        for channel in channels {
            if held.remove(channel) {
                release_one(&mut state.demand, channel);
            }
        }
        if held.is_empty() {
            state.consumers.remove(consumer);
        }
        debug!(%consumer, %key, demand = state.demand.len(), "unsubscribed");
        self.drop_key_if_idle(key);
    }

    /// Remove everything `consumer` holds under every key.
    pub fn release(&mut self, consumer: &ConsumerId) {
        let keys: Vec<BatchKey> = self.keys.keys().copied().collect();
        for key in keys {
            let Some(state) = self.keys.get_mut(&key) else {
                continue;
            };
            if let Some(held) = state.consumers.remove(consumer) {
                for channel in &held {
                    release_one(&mut state.demand, channel);
                }
                self.drop_key_if_idle(key);
            }
        }
        debug!(%consumer, "released");
    }

    /// Current demand for a key, sorted.
    #[cfg(test)]
    pub fn demand(&self, key: BatchKey) -> Vec<ChannelAddress> {
        self.keys
            .get(&key)
            .map(|state| state.demand.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ── Timers ───────────────────────────────────────────────────────

    /// Wait for a debounce timer to fire. Never completes while none is armed.
    pub async fn next_due(&mut self) -> BatchKey {
        loop {
            match poll_fn(|cx| self.timers.poll_expired(cx)).await {
                Some(expired) => {
                    let key = expired.into_inner();
                    if let Some(state) = self.keys.get_mut(&key) {
                        state.timer = None;
                    }
                    return key;
                }
                None => pending::<()>().await,
            }
        }
    }

    /// Turn a due key into a batch. `None` when there is no demand, or when
    /// the session cannot send right now (the key is refired on reconnect).
    pub fn fire(&mut self, key: BatchKey, can_send: bool) -> Option<Batch> {
        let state = self.keys.get_mut(&key)?;
        if state.demand.is_empty() {
            debug!(%key, "batch skipped, no demand");
            return None;
        }
        if !can_send {
            debug!(%key, "batch deferred until online");
            return None;
        }
        if let Some(timer) = state.timer.take() {
            self.timers.remove(&timer);
        }
        state.generation += 1;
        Some(Batch {
            key,
            generation: state.generation,
            channels: state.demand.keys().cloned().collect(),
        })
    }

    /// Batches for every key that has demand, in key order.
    pub fn fire_all(&mut self) -> Vec<Batch> {
        let mut keys: Vec<BatchKey> = self.keys.keys().copied().collect();
        keys.sort();
        keys.into_iter().filter_map(|key| self.fire(key, true)).collect()
    }

    /// Disarm every pending timer; demand is kept.
    pub fn cancel_timers(&mut self) {
        self.timers.clear();
        for state in self.keys.values_mut() {
            state.timer = None;
        }
    }

    // ── Results ──────────────────────────────────────────────────────

    /// Merge a batch result into the key's cache with a single publish.
    ///
    /// Returns `false` if the batch was superseded by a newer one for the
    /// same key (or the key is gone); its values are discarded.
    pub fn apply(&mut self, key: BatchKey, generation: u64, values: HashMap<String, Value>) -> bool {
        let current = self.keys.get(&key).map(|state| state.generation);
        if current != Some(generation) {
            debug!(%key, generation, ?current, "stale batch result discarded");
            return false;
        }

        let parsed = parse_values(values);
        let merged = match key {
            BatchKey::Live => self.live.merge(parsed),
            BatchKey::Range(range) => match self.ranges.get(&range) {
                Some(cache) => cache.merge(parsed),
                None => 0,
            },
        };
        debug!(%key, generation, merged, "batch applied");
        true
    }

    /// Merge pushed live values (`currentData`).
    pub fn apply_push(&self, values: HashMap<String, Value>) -> usize {
        self.live.merge(parse_values(values))
    }

    /// Empty every cache (edge switch, disconnect, logout).
    pub fn clear_values(&self) {
        self.live.clear();
        for cache in self.ranges.values() {
            cache.clear();
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Range keys without demand are forgotten along with their cache.
    fn drop_key_if_idle(&mut self, key: BatchKey) {
        let BatchKey::Range(range) = key else {
            return;
        };
        let idle = self.keys.get(&key).is_some_and(|state| state.demand.is_empty());
        if !idle {
            return;
        }
        if let Some(state) = self.keys.remove(&key) {
            if let Some(timer) = state.timer {
                self.timers.remove(&timer);
            }
        }
        self.ranges.remove(&range);
        debug!(%key, "range dropped, no demand left");
    }
}

fn release_one(demand: &mut BTreeMap<ChannelAddress, usize>, channel: &ChannelAddress) {
    if let Some(count) = demand.get_mut(channel) {
        *count -= 1;
        if *count == 0 {
            demand.remove(channel);
        }
    }
}

fn parse_values(values: HashMap<String, Value>) -> Vec<(ChannelAddress, Value)> {
    values
        .into_iter()
        .filter_map(|(raw, value)| match raw.parse::<ChannelAddress>() {
            Ok(address) => Some((address, value)),
            Err(e) => {
                debug!(error = %e, "ignoring value for malformed channel");
                None
            }
        })
        .collect()
}
