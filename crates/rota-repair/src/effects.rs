//! Side-effect ledger
//!
//! Every forward effect a proposal causes is recorded in order. Compensation
//! replays the ledger backwards, so removing a proposal undoes exactly what
//! staging it did and nothing else. An effect that was a no-op (room already
//! enabled, slot already requested) is never recorded.
//!
//! Store-side effects are persisted next to their token, so a repair reloaded
//! in a later session compensates the same effects it caused.

use crate::collab::ResourceToggles;
use crate::error::StoreError;
use crate::token::RepairToken;
use rota_core::{
    Availability, AvailabilityRequestId, ContextUpdate, DatasetId, SchedulingContext, TimeSlot,
};
use serde::{Deserialize, Serialize};

/// One recorded effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Context change; holds the inverse update
    Context(ContextUpdate),
    /// Room enabled in the store
    RoomEnabled(String),
    /// Pool room added in the store
    PoolRoomAdded(String),
    /// Unavailability record removed in the store
    UnavailabilityRemoved { person: String, slot: TimeSlot },
    /// Availability request created in the store
    RequestCreated {
        request: AvailabilityRequestId,
        person: String,
        slot: TimeSlot,
    },
}

impl SideEffect {
    /// Whether the effect lives in the system of record
    #[inline]
    #[must_use]
    pub fn is_store(&self) -> bool {
        !matches!(self, Self::Context(_))
    }

    /// Whether `token` causes this store effect
    #[must_use]
    pub fn caused_by(&self, token: &RepairToken) -> bool {
        match (self, token) {
            (Self::RoomEnabled(done), RepairToken::EnableRoom { room })
            | (Self::PoolRoomAdded(done), RepairToken::AddPoolRoom { room }) => done == room,
            (
                Self::UnavailabilityRemoved { person, slot }
                | Self::RequestCreated { person, slot, .. },
                RepairToken::PersonUnavailable { person: wanted, .. },
            ) => person == wanted && token.slot().as_ref() == Some(slot),
            _ => false,
        }
    }
}

/// Ordered effects of one proposal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectLedger {
    entries: Vec<SideEffect>,
}

/// Collaborators needed to run effects
pub struct EffectTarget<'a> {
    /// Dataset the effects belong to
    pub dataset: &'a DatasetId,
    /// Shared scheduling context
    pub context: &'a mut SchedulingContext,
    /// Store switches
    pub toggles: &'a dyn ResourceToggles,
}

impl EffectLedger {
    /// Create empty ledger
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded effects, oldest first
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[SideEffect] {
        &self.entries
    }

    /// Whether nothing is recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn context(&mut self, target: &mut EffectTarget<'_>, update: ContextUpdate) -> bool {
        match target.context.apply(update) {
            Some(inverse) => {
                self.entries.push(SideEffect::Context(inverse));
                true
            }
            None => false,
        }
    }

    /// Run the forward effects of one token.
    ///
    /// On error the effects recorded so far stay in the ledger; the caller
    /// compensates them.
    ///
    /// # Errors
    /// Returns the first [`StoreError`] from the toggles
    pub async fn forward(
        &mut self,
        token: &RepairToken,
        target: &mut EffectTarget<'_>,
    ) -> Result<(), StoreError> {
        match token {
            RepairToken::EnableRoom { room } => {
                if self.context(target, ContextUpdate::enable_room(room.clone())) {
                    target.toggles.enable_room(target.dataset, room).await?;
                    self.entries.push(SideEffect::RoomEnabled(room.clone()));
                }
            }
            RepairToken::AddPoolRoom { room } => {
                let added = self.context(target, ContextUpdate::AddPoolRoom { room: room.clone() });
                self.context(target, ContextUpdate::enable_room(room.clone()));
                if added {
                    target.toggles.add_pool_room(target.dataset, room).await?;
                    self.entries.push(SideEffect::PoolRoomAdded(room.clone()));
                }
            }
            RepairToken::PersonUnavailable { person, .. } => {
                let Some(slot) = token.slot() else {
                    return Ok(());
                };
                let was_unavailable =
                    target.context.availability(person, &slot) == Some(Availability::Unavailable);
                let update = ContextUpdate::SetAvailability {
                    person: person.clone(),
                    slot,
                    status: Some(Availability::Requested),
                };
                if !self.context(target, update) {
                    return Ok(());
                }
                if was_unavailable {
                    target
                        .toggles
                        .remove_person_unavailable(target.dataset, person, &slot)
                        .await?;
                    self.entries.push(SideEffect::UnavailabilityRemoved {
                        person: person.clone(),
                        slot,
                    });
                }
                let request = target
                    .toggles
                    .create_availability_request(target.dataset, person, &slot)
                    .await?;
                self.entries.push(SideEffect::RequestCreated {
                    request,
                    person: person.clone(),
                    slot,
                });
            }
            RepairToken::ExtraRoom { .. } | RepairToken::Unknown { .. } => {}
        }
        Ok(())
    }

    /// Store effects caused by `token`, oldest first
    #[must_use]
    pub fn store_effects_of(&self, token: &RepairToken) -> Vec<SideEffect> {
        self.entries
            .iter()
            .filter(|e| e.caused_by(token))
            .cloned()
            .collect()
    }

    /// Ledger for a repair reloaded from the store.
    ///
    /// The context is brought in line and its changes recorded as usual. The
    /// system of record already holds the store effects: `recorded` are the
    /// ones persisted with the token. Without a record only room switches are
    /// assumed, since an unavailability record or request cannot be inferred.
    pub fn reloaded(
        token: &RepairToken,
        recorded: Option<&[SideEffect]>,
        context: &mut SchedulingContext,
    ) -> Self {
        let mut ledger = Self::new();
        let mut sync = |update: ContextUpdate| {
            if let Some(inverse) = context.apply(update) {
                ledger.entries.push(SideEffect::Context(inverse));
            }
        };
        match token {
            RepairToken::EnableRoom { room } => {
                sync(ContextUpdate::enable_room(room.clone()));
            }
            RepairToken::AddPoolRoom { room } => {
                sync(ContextUpdate::AddPoolRoom { room: room.clone() });
                sync(ContextUpdate::enable_room(room.clone()));
            }
            RepairToken::PersonUnavailable { person, .. } => {
                if let Some(slot) = token.slot() {
                    sync(ContextUpdate::SetAvailability {
                        person: person.clone(),
                        slot,
                        status: Some(Availability::Requested),
                    });
                }
            }
            RepairToken::ExtraRoom { .. } | RepairToken::Unknown { .. } => {}
        }

        match recorded {
            Some(effects) => ledger.entries.extend(
                effects
                    .iter()
                    .filter(|e| e.is_store() && e.caused_by(token))
                    .cloned(),
            ),
            None => match token {
                RepairToken::EnableRoom { room } => {
                    ledger.entries.push(SideEffect::RoomEnabled(room.clone()));
                }
                RepairToken::AddPoolRoom { room } => {
                    ledger.entries.push(SideEffect::PoolRoomAdded(room.clone()));
                }
                RepairToken::PersonUnavailable { .. } => {
                    tracing::warn!("No recorded effects for '{}'; store side left as is", token);
                }
                RepairToken::ExtraRoom { .. } | RepairToken::Unknown { .. } => {}
            },
        }
        ledger
    }

    /// Undo recorded effects, newest first.
    ///
    /// Stops at the first failure; the failed effect and everything older
    /// remain recorded so a retry resumes where this one stopped.
    ///
    /// # Errors
    /// Returns the [`StoreError`] of the effect that could not be undone
    pub async fn compensate(&mut self, target: &mut EffectTarget<'_>) -> Result<(), StoreError> {
        while let Some(effect) = self.entries.pop() {
            let result = match &effect {
                SideEffect::Context(inverse) => {
                    target.context.apply(inverse.clone());
                    Ok(())
                }
                SideEffect::RoomEnabled(room) => {
                    target.toggles.disable_room(target.dataset, room).await
                }
                SideEffect::PoolRoomAdded(room) => {
                    target.toggles.remove_pool_room(target.dataset, room).await
                }
                SideEffect::UnavailabilityRemoved { person, slot } => {
                    target
                        .toggles
                        .add_person_unavailable(target.dataset, person, slot)
                        .await
                }
                SideEffect::RequestCreated { request, .. } => {
                    target
                        .toggles
                        .delete_availability_request(target.dataset, *request)
                        .await
                }
            };
            if let Err(e) = result {
                self.entries.push(effect);
                return Err(e);
            }
        }
        Ok(())
    }
}
