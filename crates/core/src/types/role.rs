//! User roles and allowed-role sets.

use serde::{Deserialize, Serialize};

/// Role of a portal user.
///
/// Serialized with the names the portal has always used (`"Admin"`,
/// `"Tecnico"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Role {
    /// Manages products, users and orders; can also place orders.
    Admin,
    /// Field technician: places orders and sees their own history.
    #[default]
    Tecnico,
}

impl Role {
    /// Every role, in menu order.
    pub const ALL: [Self; 2] = [Self::Admin, Self::Tecnico];

    /// Canonical name, as stored and serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Tecnico => "Tecnico",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Admin => 0b01,
            Self::Tecnico => 0b10,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    /// Parses a role name, ignoring ASCII case (older records hold
    /// lower-case names).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("admin") {
            Ok(Self::Admin)
        } else if s.eq_ignore_ascii_case("tecnico") {
            Ok(Self::Tecnico)
        } else {
            Err(format!("invalid role: {s}"))
        }
    }
}

/// A set of roles allowed through an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    /// No role at all; nobody is admitted.
    pub const EMPTY: Self = Self(0);
    /// Administrators only.
    pub const ADMIN: Self = Self(Role::Admin.bit());
    /// Any signed-in portal user.
    pub const ANY_USER: Self = Self(Role::Admin.bit() | Role::Tecnico.bit());

    /// Build a set from a list of roles.
    #[must_use]
    pub fn of(roles: &[Role]) -> Self {
        Self(roles.iter().fold(0, |acc, role| acc | role.bit()))
    }

    /// Whether `role` is in the set.
    #[must_use]
    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    /// The roles in the set, in menu order.
    #[must_use]
    pub fn roles(self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|role| self.contains(*role))
            .collect()
    }
}

impl From<Role> for RoleSet {
    fn from(role: Role) -> Self {
        Self(role.bit())
    }
}
