//! Revision cache for targeting reads.
//!
//! # Responsibility
//! - Accelerate (tag, feature) content lookups without being a source of
//!   truth.
//! - Keep backend failures away from the read path.
//!
//! # Invariants
//! - Backend errors degrade to a miss on `get` and are dropped on `set`.
//! - Entries expire after the fixed TTL given at construction.

pub mod backend;
pub mod memory;
pub mod revision_cache;
