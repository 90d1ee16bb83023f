//! User accounts and the signed-in session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Email, Requester, Role, UserAccountId};

/// A portal user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: UserAccountId,
    pub given_name: String,
    pub family_name: String,
    pub email: Email,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserAccount {
    pub given_name: String,
    pub family_name: String,
    pub email: Email,
    pub role: Role,
}

/// Edit-form changes to a user profile.
///
/// `email` is accepted so the form can echo it back, but it must equal the
/// stored email: emails never change after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChanges {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<Email>,
    pub role: Option<Role>,
}

/// The identity and role cached for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub email: Email,
    pub given_name: String,
    pub family_name: String,
    pub role: Role,
}

impl Session {
    /// Requester names stamped on orders placed in this session.
    #[must_use]
    pub fn requester(&self) -> Requester {
        Requester::new(self.given_name.clone(), self.family_name.clone())
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&UserAccount> for Session {
    fn from(account: &UserAccount) -> Self {
        Self {
            email: account.email.clone(),
            given_name: account.given_name.clone(),
            family_name: account.family_name.clone(),
            role: account.role,
        }
    }
}
