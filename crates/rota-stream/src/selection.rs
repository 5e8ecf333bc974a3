//! Selection and auto-pin
//!
//! The first fully feasible snapshot of a run is selected automatically, once.
//! An explicit user pick disables auto-selection for the rest of the run. The
//! "best" pointer is tracked independently and never changes the selection.

use rota_core::{RankKey, Snapshot, SnapshotId};

/// What observing a snapshot did to the selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionChange {
    /// Selection untouched
    Unchanged,
    /// First fully feasible snapshot was auto-selected
    AutoSelected(SnapshotId),
}

/// Selected and best pointers for the current run
#[derive(Debug, Default)]
pub struct Selection {
    selected: Option<SnapshotId>,
    auto_fired: bool,
    user_override: bool,
    best: Option<(SnapshotId, RankKey)>,
}

impl Selection {
    /// Create empty selection
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update pointers for a newly visible snapshot
    pub fn observe(&mut self, snapshot: &Snapshot) -> SelectionChange {
        let key = snapshot.rank_key();
        if self.best.map_or(true, |(_, best)| key > best) {
            self.best = Some((snapshot.id(), key));
        }

        if self.auto_fired || self.user_override || !snapshot.is_fully_feasible() {
            return SelectionChange::Unchanged;
        }
        self.auto_fired = true;
        self.selected = Some(snapshot.id());
        tracing::debug!("Auto-selected snapshot {}", snapshot.id());
        SelectionChange::AutoSelected(snapshot.id())
    }

    /// Explicit user pick; wins for the rest of the run
    pub fn select_manual(&mut self, id: SnapshotId) {
        self.user_override = true;
        self.selected = Some(id);
    }

    /// Drop the selection without re-enabling auto-selection
    pub fn clear(&mut self) {
        self.selected = None;
        self.user_override = true;
    }

    /// Recompute "best" from the snapshots still visible
    pub fn recompute_best<'a>(&mut self, visible: impl Iterator<Item = &'a Snapshot>) {
        self.best = None;
        for snapshot in visible {
            let key = snapshot.rank_key();
            if self.best.map_or(true, |(_, best)| key > best) {
                self.best = Some((snapshot.id(), key));
            }
        }
    }

    /// Currently selected snapshot
    #[inline]
    #[must_use]
    pub fn selected(&self) -> Option<SnapshotId> {
        self.selected
    }

    /// Best visible snapshot
    #[inline]
    #[must_use]
    pub fn best(&self) -> Option<SnapshotId> {
        self.best.map(|(id, _)| id)
    }

    /// The renderer must show the selected snapshot, not the base schedule
    #[inline]
    #[must_use]
    pub fn manual_preview(&self) -> bool {
        self.user_override && self.selected.is_some()
    }

    /// Whether auto-selection already fired this run
    #[inline]
    #[must_use]
    pub fn auto_fired(&self) -> bool {
        self.auto_fired
    }

    /// Forget everything (new run)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
