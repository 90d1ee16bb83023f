//! Two-step confirmation for destructive actions.
//!
//! A destructive action first records its target and hands out a token.
//! Only a confirm carrying that token executes it. The pending target is
//! cleared on confirm, on cancel, and on a confirm with the wrong token, so
//! a stale target can never be executed later.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use supply_desk_core::{HistoryId, OrderId, ProductId, RoleSet, UserAccountId};

/// What a destructive action removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConfirmTarget {
    Product(ProductId),
    User(UserAccountId),
    /// Cancel a pending order.
    Order(OrderId),
    History(HistoryId),
}

impl ConfirmTarget {
    /// Every destructive action is admin-only.
    pub const REQUIRED_ROLES: RoleSet = RoleSet::ADMIN;

    /// Prompt shown to the user.
    #[must_use]
    pub fn prompt(self) -> String {
        match self {
            Self::Product(id) => format!("Delete product {id}?"),
            Self::User(id) => format!("Delete user {id}?"),
            Self::Order(id) => format!("Cancel order {id}? It will not be kept in history."),
            Self::History(id) => format!("Permanently delete history record {id}?"),
        }
    }
}

/// A target waiting for confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub target: ConfirmTarget,
    pub token: Uuid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfirmError {
    #[error("nothing is waiting for confirmation")]
    NothingPending,

    #[error("confirmation does not match the pending action")]
    TokenMismatch,
}

/// The per-session confirmation slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationGate {
    pending: Option<PendingConfirmation>,
}

impl ConfirmationGate {
    #[must_use]
    pub const fn pending(&self) -> Option<PendingConfirmation> {
        self.pending
    }

    /// Record `target`, replacing anything pending, and return its prompt.
    pub fn request(&mut self, target: ConfirmTarget) -> PendingConfirmation {
        let pending = PendingConfirmation {
            target,
            token: Uuid::new_v4(),
        };
        self.pending = Some(pending);
        pending
    }

    /// Take the pending target if `token` matches. The slot is cleared
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns `ConfirmError::NothingPending` or `ConfirmError::TokenMismatch`.
    pub fn confirm(&mut self, token: Uuid) -> Result<ConfirmTarget, ConfirmError> {
        let pending = self.pending.take().ok_or(ConfirmError::NothingPending)?;
        if pending.token != token {
            return Err(ConfirmError::TokenMismatch);
        }
        Ok(pending.target)
    }

    /// Drop the pending target.
    pub fn cancel(&mut self) -> Option<ConfirmTarget> {
        self.pending.take().map(|p| p.target)
    }
}
