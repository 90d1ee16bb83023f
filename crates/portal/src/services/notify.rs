//! Per-user transient notifications.
//!
//! Every user-visible outcome (signed in, order submitted, reorder failed,
//! cart reminders) is pushed as a [`Notice`] to the user's channel. Notices
//! are not stored: a user with no open stream never sees them.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use supply_desk_core::Email;

/// Per-user channel capacity.
const CHANNEL_CAPACITY: usize = 32;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A transient user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notice {
    #[must_use]
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }
}

/// Fan-out of notices to each user's open streams.
#[derive(Default)]
pub struct NoticeHub {
    channels: Mutex<HashMap<Email, broadcast::Sender<Notice>>>,
}

impl NoticeHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a stream of notices for `user`.
    pub fn subscribe(&self, user: &Email) -> broadcast::Receiver<Notice> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        channels
            .entry(user.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send a notice to `user`. Returns whether any stream received it.
    pub fn send(&self, user: &Email, notice: Notice) -> bool {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(sender) = channels.get(user) else {
            tracing::debug!(user = %user, message = %notice.message, "Notice dropped, no listener");
            return false;
        };
        if sender.send(notice).is_ok() {
            true
        } else {
            // Every stream for this user is gone.
            channels.remove(user);
            false
        }
    }
}
