//! The control-plane HTTP API: thin CRUD over the rule store.
//!
//! Explicitly out of scope as a rich feature surface; this is a pass-through
//! with no independent business logic, carried because the core is
//! otherwise undrivable without a network hop for non-CLI clients.

mod handlers;
mod router;
mod server;

pub use server::AdminApiServer;
