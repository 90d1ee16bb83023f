//! Role-based access gate and the per-role navigation menu.
//!
//! The gate answers one question: does a cached session exist whose role is
//! in the allowed set? Both "not signed in" and "signed in with the wrong
//! role" resolve to [`GateState::Denied`]; callers must not tell them apart.

use serde::Serialize;

use supply_desk_core::{Role, RoleSet, Session};

/// Outcome of evaluating the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    /// Not evaluated since the allowed set last changed.
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Pure decision: grant iff a session exists and its role is allowed.
#[must_use]
pub fn permits(allowed: RoleSet, session: Option<&Session>) -> bool {
    session.is_some_and(|s| allowed.contains(s.role))
}

/// A gate over one allowed-role set that caches its last decision.
///
/// The decision is recomputed only when the allowed set changes or the gate
/// is evaluated against a different session.
#[derive(Debug, Clone)]
pub struct AccessGate {
    allowed: RoleSet,
    state: GateState,
    evaluated_for: Option<Session>,
}

impl AccessGate {
    #[must_use]
    pub const fn new(allowed: RoleSet) -> Self {
        Self {
            allowed,
            state: GateState::Unknown,
            evaluated_for: None,
        }
    }

    #[must_use]
    pub const fn allowed(&self) -> RoleSet {
        self.allowed
    }

    #[must_use]
    pub const fn state(&self) -> GateState {
        self.state
    }

    /// Replace the allowed set. A different set resets the cached decision.
    pub fn set_allowed(&mut self, allowed: RoleSet) {
        if allowed != self.allowed {
            self.allowed = allowed;
            self.state = GateState::Unknown;
            self.evaluated_for = None;
        }
    }

    /// Resolve the gate against the cached session.
    pub fn evaluate(&mut self, session: Option<&Session>) -> GateState {
        if self.state != GateState::Unknown && self.evaluated_for.as_ref() == session {
            return self.state;
        }
        self.state = if permits(self.allowed, session) {
            GateState::Granted
        } else {
            GateState::Denied
        };
        self.evaluated_for = session.cloned();
        self.state
    }
}

/// One navigation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub label: &'static str,
    pub path: &'static str,
}

const ORDER: MenuItem = MenuItem {
    label: "Order",
    path: "/",
};
const PRODUCTS: MenuItem = MenuItem {
    label: "Products",
    path: "/admin/products",
};
const ORDERS: MenuItem = MenuItem {
    label: "Orders",
    path: "/admin/orders",
};
const USERS: MenuItem = MenuItem {
    label: "Users",
    path: "/admin/users",
};
const HISTORY: MenuItem = MenuItem {
    label: "History",
    path: "/history",
};

/// Navigation entries shown to a role.
#[must_use]
pub fn menu_for(role: Role) -> &'static [MenuItem] {
    match role {
        Role::Admin => &[ORDER, PRODUCTS, ORDERS, USERS, HISTORY],
        Role::Tecnico => &[ORDER, HISTORY],
    }
}
