//! Repair token grammar
//!
//! ```text
//! enable-room <name>
//! add-pool-room <name>
//! person-unavailable <name> <YYYY-MM-DD>T<HH:MM>:00
//! extra-room <label>
//! ```
//!
//! Names may contain spaces; for `person-unavailable` the date-time is always
//! the last field. Any other directive is carried verbatim as
//! [`RepairToken::Unknown`] so that a round trip through the store never loses
//! it.

use crate::error::TokenError;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use rota_core::TimeSlot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of the slot a `person-unavailable` token refers to
pub const PERSON_SLOT_MINUTES: i64 = 60;

const ENABLE_ROOM: &str = "enable-room";
const ADD_POOL_ROOM: &str = "add-pool-room";
const PERSON_UNAVAILABLE: &str = "person-unavailable";
const EXTRA_ROOM: &str = "extra-room";

/// One parsed repair directive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum RepairToken {
    /// Enable a disabled room
    EnableRoom { room: String },
    /// Bring a room in from the shared pool
    AddPoolRoom { room: String },
    /// Relax a person's unavailability at a slot start
    PersonUnavailable { person: String, at: NaiveDateTime },
    /// Let the solver add a generic room
    ExtraRoom { label: String },
    /// Directive this version does not understand
    Unknown { raw: String },
}

impl RepairToken {
    /// Parse, keeping malformed tokens verbatim as [`RepairToken::Unknown`].
    ///
    /// Returns `None` only for blank input.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.parse() {
            Ok(token) => Some(token),
            Err(TokenError::Empty) => None,
            Err(e) => {
                tracing::warn!("Keeping malformed repair token verbatim ({}): {}", e, raw);
                Some(Self::Unknown {
                    raw: raw.to_string(),
                })
            }
        }
    }

    /// Slot affected by a `person-unavailable` token
    #[must_use]
    pub fn slot(&self) -> Option<TimeSlot> {
        match self {
            Self::PersonUnavailable { at, .. } => Some(slot_starting(*at)),
            _ => None,
        }
    }

    /// Human-readable description for display metadata
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::EnableRoom { room } => format!("Enable room {room}"),
            Self::AddPoolRoom { room } => format!("Add pool room {room}"),
            Self::PersonUnavailable { person, at } => {
                format!("Request availability of {person} on {}", at.format("%Y-%m-%d %H:%M"))
            }
            Self::ExtraRoom { label } => format!("Add extra room: {label}"),
            Self::Unknown { raw } => raw.clone(),
        }
    }
}

/// The slot of [`PERSON_SLOT_MINUTES`] starting at `at`, clipped to its day
#[must_use]
pub fn slot_starting(at: NaiveDateTime) -> TimeSlot {
    let end = at + TimeDelta::minutes(PERSON_SLOT_MINUTES);
    let end_time = if end.date() == at.date() {
        end.time()
    } else {
        NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(at.time())
    };
    TimeSlot::new(at.date(), at.time(), end_time)
}

fn argument(directive: &'static str, rest: &str) -> Result<String, TokenError> {
    let arg = rest.trim();
    if arg.is_empty() {
        return Err(TokenError::MissingArgument { directive });
    }
    Ok(arg.to_string())
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, TokenError> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| TokenError::InvalidDateTime {
            value: value.to_string(),
        })
}

impl FromStr for RepairToken {
    type Err = TokenError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TokenError::Empty);
        }
        let (directive, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));

        match directive {
            ENABLE_ROOM => Ok(Self::EnableRoom {
                room: argument(ENABLE_ROOM, rest)?,
            }),
            ADD_POOL_ROOM => Ok(Self::AddPoolRoom {
                room: argument(ADD_POOL_ROOM, rest)?,
            }),
            EXTRA_ROOM => Ok(Self::ExtraRoom {
                label: argument(EXTRA_ROOM, rest)?,
            }),
            PERSON_UNAVAILABLE => {
                let rest = argument(PERSON_UNAVAILABLE, rest)?;
                let (person, at) = rest.rsplit_once(' ').ok_or(TokenError::MissingArgument {
                    directive: PERSON_UNAVAILABLE,
                })?;
                let person = argument(PERSON_UNAVAILABLE, person)?;
                Ok(Self::PersonUnavailable {
                    person,
                    at: parse_datetime(at)?,
                })
            }
            _ => Ok(Self::Unknown {
                raw: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for RepairToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnableRoom { room } => write!(f, "{ENABLE_ROOM} {room}"),
            Self::AddPoolRoom { room } => write!(f, "{ADD_POOL_ROOM} {room}"),
            Self::PersonUnavailable { person, at } => write!(
                f,
                "{PERSON_UNAVAILABLE} {person} {}",
                at.format("%Y-%m-%dT%H:%M:00")
            ),
            Self::ExtraRoom { label } => write!(f, "{EXTRA_ROOM} {label}"),
            Self::Unknown { raw } => f.write_str(raw),
        }
    }
}
