//! Shared scheduling context
//!
//! Enabled rooms, pooled rooms and the availability grid. Both direct user
//! actions and the repair staging engine mutate this state, and both go
//! through [`SchedulingContext::apply`]. `apply` hands back the inverse update
//! whenever something actually changed, which is what compensation replays.

use crate::schedule::TimeSlot;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Availability of a person for a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Explicitly available
    Available,
    /// Explicitly unavailable
    Unavailable,
    /// Availability was requested from the person, answer pending
    Requested,
}

/// The single update path into [`SchedulingContext`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ContextUpdate {
    /// Make a room usable
    EnableRoom { room: String },
    /// Make a room unusable
    DisableRoom { room: String },
    /// Bring a room in from the shared pool
    AddPoolRoom { room: String },
    /// Return a room to the shared pool
    RemovePoolRoom { room: String },
    /// Set (or with `None`, clear) a person's availability for a slot
    SetAvailability {
        person: String,
        slot: TimeSlot,
        status: Option<Availability>,
    },
}

impl ContextUpdate {
    /// Enable a room
    #[inline]
    pub fn enable_room(room: impl Into<String>) -> Self {
        Self::EnableRoom { room: room.into() }
    }

    /// Disable a room
    #[inline]
    pub fn disable_room(room: impl Into<String>) -> Self {
        Self::DisableRoom { room: room.into() }
    }
}

/// Rooms and availability known to the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulingContext {
    enabled_rooms: BTreeSet<String>,
    pool_rooms: BTreeSet<String>,
    availability: BTreeMap<(String, TimeSlot), Availability>,
}

impl SchedulingContext {
    /// Create empty context
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with enabled rooms
    #[must_use]
    pub fn with_rooms<I, S>(mut self, rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_rooms.extend(rooms.into_iter().map(Into::into));
        self
    }

    /// Seed an availability entry
    #[must_use]
    pub fn with_availability(
        mut self,
        person: impl Into<String>,
        slot: TimeSlot,
        status: Availability,
    ) -> Self {
        self.availability.insert((person.into(), slot), status);
        self
    }

    /// Apply an update, returning its inverse if anything changed
    pub fn apply(&mut self, update: ContextUpdate) -> Option<ContextUpdate> {
        match update {
            ContextUpdate::EnableRoom { room } => self
                .enabled_rooms
                .insert(room.clone())
                .then_some(ContextUpdate::DisableRoom { room }),
            ContextUpdate::DisableRoom { room } => self
                .enabled_rooms
                .remove(&room)
                .then_some(ContextUpdate::EnableRoom { room }),
            ContextUpdate::AddPoolRoom { room } => self
                .pool_rooms
                .insert(room.clone())
                .then_some(ContextUpdate::RemovePoolRoom { room }),
            ContextUpdate::RemovePoolRoom { room } => self
                .pool_rooms
                .remove(&room)
                .then_some(ContextUpdate::AddPoolRoom { room }),
            ContextUpdate::SetAvailability {
                person,
                slot,
                status,
            } => {
                let key = (person, slot);
                let previous = match status {
                    Some(s) => self.availability.insert(key.clone(), s),
                    None => self.availability.remove(&key),
                };
                (previous != status).then(|| ContextUpdate::SetAvailability {
                    person: key.0,
                    slot: key.1,
                    status: previous,
                })
            }
        }
    }

    /// Whether a room is enabled
    #[inline]
    #[must_use]
    pub fn is_room_enabled(&self, room: &str) -> bool {
        self.enabled_rooms.contains(room)
    }

    /// Whether a pooled room has been brought into the dataset
    #[inline]
    #[must_use]
    pub fn is_pool_room(&self, room: &str) -> bool {
        self.pool_rooms.contains(room)
    }

    /// Rooms that may receive placements, in name order
    #[must_use]
    pub fn available_rooms(&self) -> Vec<String> {
        self.enabled_rooms.iter().cloned().collect()
    }

    /// Exact availability entry for a person and slot
    #[inline]
    #[must_use]
    pub fn availability(&self, person: &str, slot: &TimeSlot) -> Option<Availability> {
        self.availability
            .get(&(person.to_string(), *slot))
            .copied()
    }

    /// Whether any unavailability entry for the person overlaps `slot`
    #[must_use]
    pub fn is_unavailable(&self, person: &str, slot: &TimeSlot) -> bool {
        self.availability.iter().any(|((p, s), status)| {
            p == person && *status == Availability::Unavailable && s.overlaps(slot)
        })
    }
}
