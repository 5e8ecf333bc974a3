//! Edits, their local pre-check and their inverses

use crate::error::EditError;
use rota_core::{ContextUpdate, ItemId, LiveSchedule, Placement, SchedulingContext};
use serde::{Deserialize, Serialize};

/// Edits of the same class invalidate each other's pending validations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationClass {
    /// Placement of items in rooms and slots
    Placement,
    /// Rooms and availability
    Context,
}

/// A direct user edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edit", rename_all = "snake_case")]
pub enum Mutation {
    /// Place or move an item
    Move { item: ItemId, placement: Placement },
    /// Take an item off the schedule
    Unschedule { item: ItemId },
    /// Pin or unpin an item in place
    Pin { item: ItemId, pinned: bool },
    /// Change rooms or availability
    Context(ContextUpdate),
}

impl Mutation {
    /// Class used for stale-validation tracking
    #[must_use]
    pub fn class(&self) -> MutationClass {
        match self {
            Self::Move { .. } | Self::Unschedule { .. } | Self::Pin { .. } => {
                MutationClass::Placement
            }
            Self::Context(_) => MutationClass::Context,
        }
    }

    /// Synchronous local pre-check against the current state
    ///
    /// # Errors
    /// The first reason the edit cannot be applied
    pub fn precheck(
        &self,
        schedule: &LiveSchedule,
        context: &SchedulingContext,
    ) -> Result<(), EditError> {
        match self {
            Self::Move { item, placement } => {
                if !context.is_room_enabled(&placement.room) {
                    return Err(EditError::RoomDisabled {
                        room: placement.room.clone(),
                    });
                }
                let with = schedule.collisions(item, placement);
                if !with.is_empty() {
                    return Err(EditError::Collision {
                        item: item.clone(),
                        with,
                    });
                }
                if let Some(person) = schedule
                    .participants(item)
                    .iter()
                    .find(|p| context.is_unavailable(p, &placement.slot))
                {
                    return Err(EditError::Unavailable {
                        person: person.clone(),
                        slot: placement.slot,
                    });
                }
                if schedule.placement(item) == Some(placement) {
                    return Err(EditError::NoChange);
                }
                Ok(())
            }
            Self::Unschedule { item } => schedule
                .placement(item)
                .map(|_| ())
                .ok_or_else(|| EditError::NotPlaced(item.clone())),
            Self::Pin { item, pinned } => match schedule.placement(item) {
                None => Err(EditError::NotPlaced(item.clone())),
                Some(p) if p.pinned == *pinned => Err(EditError::NoChange),
                Some(_) => Ok(()),
            },
            Self::Context(_) => Ok(()),
        }
    }

    /// Apply without checks, returning the inverse
    ///
    /// # Errors
    /// [`EditError::NoChange`] for a context update that changed nothing,
    /// [`EditError::NotPlaced`] when the item vanished
    pub fn apply(
        self,
        schedule: &mut LiveSchedule,
        context: &mut SchedulingContext,
    ) -> Result<Inverse, EditError> {
        match self {
            Self::Move { item, placement } => {
                let previous = schedule.place(item.clone(), placement);
                Ok(Inverse::Schedule {
                    item,
                    placement: previous,
                })
            }
            Self::Unschedule { item } => {
                let previous = schedule
                    .unschedule(&item)
                    .ok_or_else(|| EditError::NotPlaced(item.clone()))?;
                Ok(Inverse::Schedule {
                    item,
                    placement: Some(previous),
                })
            }
            Self::Pin { item, pinned } => {
                let mut placement = schedule
                    .placement(&item)
                    .cloned()
                    .ok_or_else(|| EditError::NotPlaced(item.clone()))?;
                placement.pinned = pinned;
                let previous = schedule.place(item.clone(), placement);
                Ok(Inverse::Schedule {
                    item,
                    placement: previous,
                })
            }
            Self::Context(update) => context
                .apply(update)
                .map(Inverse::Context)
                .ok_or(EditError::NoChange),
        }
    }
}

/// Exact local undo of an applied edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inverse {
    /// Put an item back (or leave it unscheduled)
    Schedule {
        item: ItemId,
        placement: Option<Placement>,
    },
    /// Context update restoring the prior value
    Context(ContextUpdate),
}

impl Inverse {
    /// Class of the edit this undoes
    #[must_use]
    pub fn class(&self) -> MutationClass {
        match self {
            Self::Schedule { .. } => MutationClass::Placement,
            Self::Context(_) => MutationClass::Context,
        }
    }

    /// Apply, returning the inverse of the inverse (for redo)
    #[must_use]
    pub fn apply(self, schedule: &mut LiveSchedule, context: &mut SchedulingContext) -> Self {
        match self {
            Self::Schedule { item, placement } => {
                let current = schedule.placement(&item).cloned();
                schedule.restore(item.clone(), placement);
                Self::Schedule {
                    item,
                    placement: current,
                }
            }
            Self::Context(update) => {
                let redo = context.apply(update.clone());
                // A no-op undo still has to be redoable as the same update
                Self::Context(redo.unwrap_or(update))
            }
        }
    }

    /// The edit the validation service should see for this inverse
    #[must_use]
    pub fn as_mutation(&self) -> Mutation {
        match self {
            Self::Schedule {
                item,
                placement: Some(placement),
            } => Mutation::Move {
                item: item.clone(),
                placement: placement.clone(),
            },
            Self::Schedule {
                item,
                placement: None,
            } => Mutation::Unschedule { item: item.clone() },
            Self::Context(update) => Mutation::Context(update.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use rota_core::{Availability, TimeSlot};

    fn slot(hour: u32) -> TimeSlot {
        TimeSlot::new(
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
        )
    }

    fn state() -> (LiveSchedule, SchedulingContext) {
        let mut schedule = LiveSchedule::new()
            .with_participants("maths", ["Ada"])
            .with_participants("physics", ["Alan"]);
        schedule.place(ItemId::from("physics"), Placement::new("A", slot(9)));
        let context = SchedulingContext::new()
            .with_rooms(["A", "B"])
            .with_availability("Ada", slot(11), Availability::Unavailable);
        (schedule, context)
    }

    fn moving(item: &str, room: &str, hour: u32) -> Mutation {
        Mutation::Move {
            item: ItemId::from(item),
            placement: Placement::new(room, slot(hour)),
        }
    }

    #[test]
    fn precheck_rejects_disabled_room() {
        let (schedule, context) = state();
        assert!(matches!(
            moving("maths", "C", 10).precheck(&schedule, &context),
            Err(EditError::RoomDisabled { .. })
        ));
    }

    #[test]
    fn precheck_rejects_collision() {
        let (schedule, context) = state();
        assert_eq!(
            moving("maths", "A", 9).precheck(&schedule, &context),
            Err(EditError::Collision {
                item: ItemId::from("maths"),
                with: vec![ItemId::from("physics")],
            })
        );
        // Moving onto itself is not a collision
        assert_eq!(
            moving("physics", "A", 9).precheck(&schedule, &context),
            Err(EditError::NoChange)
        );
    }

    #[test]
    fn precheck_rejects_unavailable_participant() {
        let (schedule, context) = state();
        assert!(matches!(
            moving("maths", "B", 11).precheck(&schedule, &context),
            Err(EditError::Unavailable { person, .. }) if person == "Ada"
        ));
        assert!(moving("maths", "B", 10).precheck(&schedule, &context).is_ok());
    }

    #[test]
    fn inverse_restores_exactly() {
        let (mut schedule, mut context) = state();
        let before = (schedule.clone(), context.clone());

        let undo_move = moving("physics", "B", 10).apply(&mut schedule, &mut context).unwrap();
        let undo_room = Mutation::Context(ContextUpdate::disable_room("A"))
            .apply(&mut schedule, &mut context)
            .unwrap();
        assert!(!context.is_room_enabled("A"));

        let redo_room = undo_room.apply(&mut schedule, &mut context);
        let redo_move = undo_move.apply(&mut schedule, &mut context);
        assert_eq!((schedule.clone(), context.clone()), before);

        let _ = redo_move.apply(&mut schedule, &mut context);
        let _ = redo_room.apply(&mut schedule, &mut context);
        assert_eq!(
            schedule.placement(&ItemId::from("physics")).map(|p| p.room.as_str()),
            Some("B")
        );
        assert!(!context.is_room_enabled("A"));
    }
}
