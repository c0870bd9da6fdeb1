// ── Request correlation ──
//
// Pending-request table keyed by JSON-RPC id, with one deadline per entry.
// Owned by the session actor; nothing here is shared across tasks.

use std::collections::HashMap;
use std::future::{pending, poll_fn};
use std::time::Duration;

use emslink_api::JsonRpcResponse;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::error::CoreError;

/// One request awaiting its response.
///
/// `target` says what to complete when the response (or its failure)
/// arrives: a caller's oneshot, a login, a subscription batch.
#[derive(Debug)]
pub(crate) struct PendingRequest<T> {
    pub method: String,
    pub issued_at: Instant,
    pub timeout: Duration,
    pub target: T,
    /// Written to a socket. Entries still waiting in the offline queue
    /// survive a transport loss; transmitted ones do not.
    pub transmitted: bool,
    timer: delay_queue::Key,
}

impl<T> PendingRequest<T> {
    pub fn timeout_error(&self) -> CoreError {
        CoreError::Timeout {
            method: self.method.clone(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

pub(crate) struct RequestCorrelator<T> {
    pending: HashMap<Uuid, PendingRequest<T>>,
    timers: DelayQueue<Uuid>,
}

impl<T> RequestCorrelator<T> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            timers: DelayQueue::new(),
        }
    }

    /// Create a pending entry with a fresh random id and arm its deadline.
    ///
    /// Deadlines are capped at [`SessionConfig::MAX_TIMER`]; the timer
    /// wheel cannot hold anything longer.
    pub fn register(&mut self, method: impl Into<String>, target: T, timeout: Duration) -> Uuid {
        let id = Uuid::new_v4();
        let timeout = timeout.min(SessionConfig::MAX_TIMER);
        let timer = self.timers.insert(id, timeout);
        self.pending.insert(
            id,
            PendingRequest {
                method: method.into(),
                issued_at: Instant::now(),
                timeout,
                target,
                transmitted: false,
                timer,
            },
        );
        id
    }

    pub fn mark_sent(&mut self, id: Uuid) {
        if let Some(entry) = self.pending.get_mut(&id) {
            entry.transmitted = true;
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Match a response to its pending entry.
    ///
    /// Returns `None` for ids that are not pending (never issued, already
    /// resolved, or timed out); those frames are dropped.
    pub fn resolve(
        &mut self,
        response: JsonRpcResponse,
    ) -> Option<(Uuid, PendingRequest<T>, Result<Value, CoreError>)> {
        let Ok(id) = Uuid::parse_str(&response.id) else {
            debug!(id = %response.id, "response with foreign id dropped");
            return None;
        };
        let Some(entry) = self.take(id) else {
            debug!(%id, "response for unknown request dropped");
            return None;
        };

        debug!(
            %id,
            method = %entry.method,
            elapsed_ms = u64::try_from(entry.issued_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "response correlated"
        );
        let outcome = response.outcome.map_err(CoreError::from);
        Some((id, entry, outcome))
    }

    /// Remove an entry without resolving it (eviction, local failure).
    pub fn cancel(&mut self, id: Uuid) -> Option<PendingRequest<T>> {
        self.take(id)
    }

    /// Wait for the next deadline to pass and hand back the expired entry.
    ///
    /// Never completes while nothing is pending. Cancel-safe.
    pub async fn next_expired(&mut self) -> (Uuid, PendingRequest<T>) {
        loop {
            match poll_fn(|cx| self.timers.poll_expired(cx)).await {
                Some(expired) => {
                    let id = expired.into_inner();
                    if let Some(entry) = self.pending.remove(&id) {
                        return (id, entry);
                    }
                }
                None => pending::<()>().await,
            }
        }
    }

    /// Remove every entry that was written to a socket.
    pub fn drain_in_flight(&mut self) -> Vec<(Uuid, PendingRequest<T>)> {
        let ids: Vec<Uuid> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.transmitted)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.take(id).map(|entry| (id, entry)))
            .collect()
    }

    /// Remove every entry.
    pub fn drain(&mut self) -> Vec<(Uuid, PendingRequest<T>)> {
        self.timers.clear();
        self.pending.drain().collect()
    }

    fn take(&mut self, id: Uuid) -> Option<PendingRequest<T>> {
        let entry = self.pending.remove(&id)?;
        self.timers.remove(&entry.timer);
        Some(entry)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use emslink_api::JsonRpcError;
    use serde_json::json;

    fn ok(id: Uuid, result: Value) -> JsonRpcResponse {
        JsonRpcResponse {
            id: id.to_string(),
            outcome: Ok(result),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_in_arrival_order_not_request_order() {
        let mut c = RequestCorrelator::new();
        let first = c.register("a", 1, Duration::from_secs(5));
        let second = c.register("b", 2, Duration::from_secs(5));
        assert_ne!(first, second);

        let (id, entry, outcome) = c.resolve(ok(second, json!("B"))).unwrap();
        assert_eq!(id, second);
        assert_eq!(entry.target, 2);
        assert_eq!(outcome.unwrap(), json!("B"));

        let (_, entry, outcome) = c.resolve(ok(first, json!("A"))).unwrap();
        assert_eq!(entry.target, 1);
        assert_eq!(outcome.unwrap(), json!("A"));
        assert!(c.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn error_member_becomes_protocol_error() {
        let mut c = RequestCorrelator::new();
        let id = c.register("getEdges", (), Duration::from_secs(5));

        let (_, _, outcome) = c
            .resolve(JsonRpcResponse {
                id: id.to_string(),
                outcome: Err(JsonRpcError {
                    code: 1003,
                    message: "denied".into(),
                    data: None,
                }),
            })
            .unwrap();
        assert_eq!(
            outcome.unwrap_err(),
            CoreError::Protocol {
                code: 1003,
                message: "denied".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_ids_leave_table_untouched() {
        let mut c = RequestCorrelator::new();
        let id = c.register("a", (), Duration::from_secs(5));

        assert!(c.resolve(ok(Uuid::new_v4(), json!(null))).is_none());
        assert!(
            c.resolve(JsonRpcResponse {
                id: "not-a-uuid".into(),
                outcome: Ok(json!(null)),
            })
            .is_none()
        );
        assert!(c.contains(id));
        assert_eq!(c.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_removes_entry_so_late_response_is_unknown() {
        let mut c = RequestCorrelator::new();
        let id = c.register("slow", (), Duration::from_millis(100));

        let (expired_id, entry) = c.next_expired().await;
        assert_eq!(expired_id, id);
        assert_eq!(
            entry.timeout_error(),
            CoreError::Timeout {
                method: "slow".into(),
                timeout_ms: 100
            }
        );
        assert!(c.resolve(ok(id, json!(1))).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_entries_never_expire() {
        let mut c = RequestCorrelator::new();
        let fast = c.register("fast", (), Duration::from_millis(50));
        let slow = c.register("slow", (), Duration::from_millis(200));
        c.resolve(ok(fast, json!(1))).unwrap();

        let (expired_id, _) = c.next_expired().await;
        assert_eq!(expired_id, slow);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_in_flight_keeps_untransmitted_entries() {
        let mut c = RequestCorrelator::new();
        let sent = c.register("sent", (), Duration::from_secs(5));
        let queued = c.register("queued", (), Duration::from_secs(5));
        c.mark_sent(sent);

        let drained = c.drain_in_flight();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0, sent);
        assert!(c.contains(queued));

        assert_eq!(c.drain().len(), 1);
        assert!(c.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_deadline_is_capped() {
        let mut c = RequestCorrelator::new();
        let id = c.register("forever", (), Duration::from_secs(100_000_000));
        assert_eq!(c.pending[&id].timeout, SessionConfig::MAX_TIMER);

        let (expired_id, entry) = c.next_expired().await;
        assert_eq!(expired_id, id);
        assert_eq!(entry.timeout, SessionConfig::MAX_TIMER);
    }
}
