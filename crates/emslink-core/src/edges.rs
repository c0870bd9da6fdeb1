// ── Edge registry ──
//
// Known edges and the current selection. Readable from any task through
// snapshots; mutated only by the session actor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use emslink_api::protocol::EdgeStatus;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::Edge;

pub(crate) struct EdgeRegistry {
    by_id: DashMap<String, Arc<Edge>>,

    /// All edges sorted by id, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<Edge>>>>,

    selected: watch::Sender<Option<Arc<Edge>>>,

    /// Bumped whenever the selection changes. Work started under an older
    /// epoch belongs to a different edge and must be discarded.
    epoch: AtomicU64,
}

impl EdgeRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        let (selected, _) = watch::channel(None);
        Self {
            by_id: DashMap::new(),
            snapshot,
            selected,
            epoch: AtomicU64::new(0),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Option<Arc<Edge>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<Edge>>> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Edge>>>> {
        self.snapshot.subscribe()
    }

    pub fn selected(&self) -> Option<Arc<Edge>> {
        self.selected.borrow().clone()
    }

    pub fn selected_id(&self) -> Option<String> {
        self.selected.borrow().as_ref().map(|edge| edge.id.clone())
    }

    pub fn subscribe_selected(&self) -> watch::Receiver<Option<Arc<Edge>>> {
        self.selected.subscribe()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace the full edge list. A selected edge that vanished is deselected.
    /// Returns `true` if the selection changed.
    pub fn replace_all(&self, edges: impl IntoIterator<Item = Edge>) -> bool {
        self.by_id.clear();
        for edge in edges {
            self.by_id.insert(edge.id.clone(), Arc::new(edge));
        }
        self.rebuild_snapshot();
        self.reconcile_selection()
    }

    /// Insert or update edges (one page of `getEdges`).
    pub fn upsert_many(&self, edges: impl IntoIterator<Item = Edge>) {
        for edge in edges {
            self.by_id.insert(edge.id.clone(), Arc::new(edge));
        }
        self.rebuild_snapshot();
        self.refresh_selected();
    }

    /// Apply `edgesStatusUpdate` entries. Unknown ids are ignored.
    pub fn apply_status(&self, updates: &[EdgeStatus]) -> usize {
        let mut changed = 0;
        for status in updates {
            let Some(mut entry) = self.by_id.get_mut(&status.id) else {
                debug!(edge_id = %status.id, "status update for unknown edge ignored");
                continue;
            };
            let updated = entry.with_status(status);
            if updated != **entry {
                *entry = Arc::new(updated);
                changed += 1;
            }
        }
        if changed > 0 {
            self.rebuild_snapshot();
            self.refresh_selected();
        }
        changed
    }

    /// Select an edge by id. Returns `true` if the selection changed.
    pub fn select(&self, id: &str) -> Result<bool, CoreError> {
        let edge = self.get(id).ok_or_else(|| CoreError::UnknownEdge {
            edge_id: id.to_owned(),
        })?;
        if self.selected_id().as_deref() == Some(id) {
            return Ok(false);
        }
        self.selected.send_replace(Some(edge));
        self.epoch.fetch_add(1, Ordering::AcqRel);
        Ok(true)
    }

    /// Forget everything (logout).
    pub fn clear(&self) {
        self.by_id.clear();
        self.rebuild_snapshot();
        if self.selected.send_replace(None).is_some() {
            self.epoch.fetch_add(1, Ordering::AcqRel);
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Edge>> = self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    /// Point the selection at the current version of the selected edge.
    fn refresh_selected(&self) {
        if let Some(edge) = self.selected_id().and_then(|id| self.get(&id)) {
            self.selected.send_replace(Some(edge));
        }
    }

    fn reconcile_selection(&self) -> bool {
        let Some(id) = self.selected_id() else {
            return false;
        };
        if let Some(edge) = self.get(&id) {
            self.selected.send_replace(Some(edge));
            false
        } else {
            debug!(edge_id = %id, "selected edge no longer listed, deselecting");
            self.selected.send_replace(None);
            self.epoch.fetch_add(1, Ordering::AcqRel);
            true
        }
    }
}
