//! Banner store: repository contracts and SQLite persistence.
//!
//! # Responsibility
//! - Define the banner data access contract consumed by the service layer.
//! - Keep SQL, transactions, version retention and targeting reconciliation
//!   inside the persistence boundary.
//!
//! # Invariants
//! - Every multi-statement write runs in one `IMMEDIATE` transaction.
//! - Repository APIs return semantic errors (`NotFound`, `Constraint`) in
//!   addition to DB transport errors.

pub mod banner_repo;
mod targeting;
mod versions;
