//! Repository layer for the materialized-path outline table.
//!
//! # Responsibility
//! - Define the row-level data access contract used by the outline services.
//! - Isolate SQLite query details from reparenting and tree-building logic.
//!
//! # Invariants
//! - Tree queries return rows ordered by `p1..p9 ASC` (depth-first pre-order).
//! - Repositories never touch caches; callers invalidate after writes.

pub mod book_repo;
