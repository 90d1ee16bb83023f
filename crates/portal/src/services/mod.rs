//! Business logic services for the portal.
//!
//! # Services
//!
//! - `access` - Role gate and per-role menus
//! - `auth` - Email/password sign-in and account creation (Argon2id)
//! - `cart` - Per-user cart with delayed reminders
//! - `catalog` - Catalog view with optimistic reorder and reconciliation
//! - `confirm` - Two-step confirmation for destructive actions
//! - `hours` - Business hours and the clock
//! - `notify` - Per-user transient notices
//! - `orders` - Order lifecycle and history
//! - `users` - User administration

pub mod access;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod confirm;
pub mod hours;
pub mod notify;
pub mod orders;
pub mod users;

pub use access::{AccessGate, GateState, MenuItem, menu_for, permits};
pub use auth::{AccountForm, AuthError, AuthService, PasswordPolicy};
pub use cart::{CartAccumulator, CartError, CartRegistry, CartView};
pub use catalog::{CatalogError, CatalogReorderController, CatalogSnapshot, ReorderOutcome};
pub use confirm::{ConfirmError, ConfirmTarget, ConfirmationGate, PendingConfirmation};
pub use hours::{BusinessHours, Clock, OrderingStatus};
pub use notify::{Notice, NoticeHub, NoticeLevel};
pub use orders::{OrderError, OrderLifecycleManager, group_by_requester, history_filter};
pub use users::{UserAdminError, UserAdminService};
