//! Error types for optimistic edits

use rota_core::{ItemId, TimeSlot};

/// Local rejection of an edit
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    /// Target room is not enabled
    #[error("room {room} is not enabled")]
    RoomDisabled { room: String },

    /// Target room and time are taken
    #[error("{item} would collide with {with:?}")]
    Collision { item: ItemId, with: Vec<ItemId> },

    /// A participant cannot attend
    #[error("{person} is unavailable at {slot}")]
    Unavailable { person: String, slot: TimeSlot },

    /// Item has no placement to act on
    #[error("{0} is not scheduled")]
    NotPlaced(ItemId),

    /// The edit would change nothing
    #[error("edit changes nothing")]
    NoChange,

    /// Undo history is empty
    #[error("nothing to undo")]
    NothingToUndo,

    /// Redo history is empty
    #[error("nothing to redo")]
    NothingToRedo,
}

impl EditError {
    /// Rejected by the local pre-check (as opposed to a history miss)
    #[inline]
    #[must_use]
    pub fn is_precheck(&self) -> bool {
        matches!(
            self,
            Self::RoomDisabled { .. } | Self::Collision { .. } | Self::Unavailable { .. }
        )
    }
}

/// Validation service failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Service could not be reached
    #[error("validation service unavailable: {0}")]
    Unavailable(String),

    /// Service refused the request
    #[error("validation rejected: {0}")]
    Rejected(String),
}
