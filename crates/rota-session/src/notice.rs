//! User-facing notices
//!
//! Errors never reach the user as failures of the coordinator; they become
//! notices in a bounded queue. The oldest notice is dropped when it is full.

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Informational
    Info,
    /// Something needs the user's attention
    Warning,
    /// An action failed
    Error,
}

/// One toast message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Text shown to the user
    pub message: String,
}

impl Notice {
    /// Informational notice
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    /// Warning notice
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    /// Error notice
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    /// Notice for a failed user action
    #[must_use]
    pub fn from_error(error: &SessionError) -> Self {
        match error {
            SessionError::Edit(e) if e.is_precheck() => Self::warning(e.to_string()),
            SessionError::Stream(_) | SessionError::NothingToReconnect => {
                Self::warning(error.to_string())
            }
            _ => Self::error(error.to_string()),
        }
    }
}

/// Bounded notice queue
#[derive(Debug, Clone)]
pub struct Notices {
    queue: VecDeque<Notice>,
    capacity: usize,
}

impl Notices {
    /// Create queue holding at most `capacity` notices
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Queue a notice, dropping the oldest when full
    pub fn push(&mut self, notice: Notice) {
        if self.queue.len() == self.capacity {
            self.queue.pop_front();
        }
        tracing::debug!("Notice ({:?}): {}", notice.level, notice.message);
        self.queue.push_back(notice);
    }

    /// Notices, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.queue.iter()
    }

    /// Number of queued notices
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every notice
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
