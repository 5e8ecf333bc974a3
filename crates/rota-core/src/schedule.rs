//! The live schedule
//!
//! What the user currently sees and edits: item placements plus the people
//! attending each item. Solver results are applied into it, the optimistic
//! edit pipeline mutates it, and the repair apply protocol resets parts of it.

use crate::ids::ItemId;
use crate::solve::Assignment;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A time range on a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    /// Calendar day
    pub day: NaiveDate,
    /// Inclusive start
    pub start: NaiveTime,
    /// Exclusive end
    pub end: NaiveTime,
}

impl TimeSlot {
    /// Create a slot
    #[inline]
    #[must_use]
    pub fn new(day: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self { day, start, end }
    }

    /// Half-open overlap on the same day
    #[inline]
    #[must_use]
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.day == other.day && self.start < other.end && other.start < self.end
    }

    /// Start as a naive datetime
    #[inline]
    #[must_use]
    pub fn starts_at(&self) -> NaiveDateTime {
        self.day.and_time(self.start)
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.day,
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Where and when an item is placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Room name
    pub room: String,
    /// Time range
    pub slot: TimeSlot,
    /// Pinned placements survive a must-fix re-solve
    #[serde(default)]
    pub pinned: bool,
}

impl Placement {
    /// Create an unpinned placement
    #[inline]
    #[must_use]
    pub fn new(room: impl Into<String>, slot: TimeSlot) -> Self {
        Self {
            room: room.into(),
            slot,
            pinned: false,
        }
    }

    /// Mark placement as pinned
    #[inline]
    #[must_use]
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// Same room and overlapping time
    #[inline]
    #[must_use]
    pub fn collides_with(&self, other: &Placement) -> bool {
        self.room == other.room && self.slot.overlaps(&other.slot)
    }
}

/// Current placements of all schedulable items
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchedule {
    placements: BTreeMap<ItemId, Placement>,
    participants: BTreeMap<ItemId, Vec<String>>,
}

impl LiveSchedule {
    /// Create empty schedule
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the people attending an item
    #[must_use]
    pub fn with_participants<I, S>(mut self, item: impl Into<ItemId>, people: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants
            .insert(item.into(), people.into_iter().map(Into::into).collect());
        self
    }

    /// Current placement of an item
    #[inline]
    #[must_use]
    pub fn placement(&self, item: &ItemId) -> Option<&Placement> {
        self.placements.get(item)
    }

    /// People attending an item
    #[inline]
    #[must_use]
    pub fn participants(&self, item: &ItemId) -> &[String] {
        self.participants.get(item).map_or(&[], Vec::as_slice)
    }

    /// Place an item, returning its previous placement
    pub fn place(&mut self, item: ItemId, placement: Placement) -> Option<Placement> {
        self.placements.insert(item, placement)
    }

    /// Remove an item's placement, returning it
    pub fn unschedule(&mut self, item: &ItemId) -> Option<Placement> {
        self.placements.remove(item)
    }

    /// Restore an item to a previously captured placement (or to unscheduled)
    pub fn restore(&mut self, item: ItemId, placement: Option<Placement>) {
        match placement {
            Some(p) => {
                self.placements.insert(item, p);
            }
            None => {
                self.placements.remove(&item);
            }
        }
    }

    /// Items that would share a room and time with `placement`, excluding `item`
    #[must_use]
    pub fn collisions(&self, item: &ItemId, placement: &Placement) -> Vec<ItemId> {
        self.placements
            .iter()
            .filter(|(other, p)| *other != item && p.collides_with(placement))
            .map(|(other, _)| other.clone())
            .collect()
    }

    /// Iterate placements in item order
    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, &Placement)> {
        self.placements.iter()
    }

    /// Number of placed items
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// Whether nothing is placed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Replace all placements with a solver result's assignments.
    ///
    /// Participants are dataset facts and are kept.
    pub fn replace_with(&mut self, assignments: &[Assignment]) {
        self.placements = assignments
            .iter()
            .map(|a| (a.item.clone(), a.placement()))
            .collect();
    }

    /// Unschedule the given items, optionally keeping pinned ones in place.
    ///
    /// Returns the removed placements so the caller can restore them.
    pub fn unschedule_items(
        &mut self,
        items: &[ItemId],
        keep_pinned: bool,
    ) -> Vec<(ItemId, Placement)> {
        let mut removed = Vec::new();
        for item in items {
            let pinned = self.placements.get(item).is_some_and(|p| p.pinned);
            if keep_pinned && pinned {
                continue;
            }
            if let Some(p) = self.placements.remove(item) {
                removed.push((item.clone(), p));
            }
        }
        removed
    }

    /// Pinned placements as solver assignments
    #[must_use]
    pub fn pinned_assignments(&self) -> Vec<Assignment> {
        self.placements
            .iter()
            .filter(|(_, p)| p.pinned)
            .map(|(item, p)| Assignment::from_placement(item.clone(), p.clone()))
            .collect()
    }
}
