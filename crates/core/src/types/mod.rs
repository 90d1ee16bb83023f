//! Core types for Supply Desk.
//!
//! This module provides type-safe wrappers and records for the domain.

pub mod account;
pub mod catalog;
pub mod email;
pub mod id;
pub mod order;
pub mod role;
pub mod status;
pub mod vehicle;

pub use account::{NewUserAccount, Session, UserAccount, UserChanges};
pub use catalog::{
    CatalogEntry, CatalogInputError, NewCatalogEntry, ProductChanges, next_display_order,
    sort_for_display,
};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{CartLine, HistoricalOrder, NewOrder, Order, Requester};
pub use role::{Role, RoleSet};
pub use status::*;
pub use vehicle::{VehicleTag, VehicleTagError};
