//! Banner domain model.
//!
//! # Responsibility
//! - Define the read models returned by the banner store.
//! - Define the write payload shared by create and partial-update paths.
//!
//! # Invariants
//! - A (tag, feature) pair resolves to at most one banner.
//! - At most `MAX_RETAINED_VERSIONS` snapshots exist per banner.

pub mod banner;
