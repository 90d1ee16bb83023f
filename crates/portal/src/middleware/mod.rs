//! HTTP middleware for the portal.
//!
//! # Layer order (outermost first)
//!
//! 1. Sentry (`NewSentryLayer`, `SentryHttpLayer`)
//! 2. `TraceLayer` (request span with method, uri, status, latency)
//! 3. Session layer (tower-sessions, `PostgreSQL` or in-memory store)
//!
//! Access control is not a layer: each handler takes a gate extractor
//! ([`RequireUser`], [`RequireAdmin`]) so the allowed roles sit next to the
//! route they protect.

pub mod auth;
pub mod session;

pub use auth::{
    AdminOnly, Allowed, AnyUser, GateRejection, Gated, OptionalUser, RequireAdmin, RequireUser,
    SessionCache,
};
pub use session::{SESSION_COOKIE_NAME, memory_session_layer, postgres_session_layer};
