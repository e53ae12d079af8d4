//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository and cache calls into the operation set used by
//!   the external request layer.
//! - Keep request handling decoupled from storage details.

pub mod banner_service;
