//! Book outline domain model.
//!
//! # Responsibility
//! - Define the persisted materialized-path row (`BookLink`).
//! - Define derived, per-request tree views built from those rows.
//!
//! # Invariants
//! - A link's `parents` array always ends its chain with the link's own id.
//! - Tree views are never persisted; they are rebuilt or read from cache.

pub mod book_link;
pub mod tree;
