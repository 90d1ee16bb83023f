//! Supply Desk Core - Shared domain types.
//!
//! This crate provides the types used across all Supply Desk components:
//! - `portal` - HTTP API for technicians and administrators
//! - `cli` - Command-line tools for migrations, bootstrap users and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere, including tests that never touch a store.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, emails, roles, statuses, and the catalog, order
//!   and account records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
