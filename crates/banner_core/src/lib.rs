//! Core persistence and orchestration for targeted banners.
//! This crate is the single source of truth for banner invariants.

pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use cache::backend::{CacheBackend, CacheError};
pub use cache::memory::MemoryCacheBackend;
pub use cache::revision_cache::RevisionCache;
pub use config::{load_config, BannerConfig, ConfigError};
pub use context::{CancelHandle, Interrupted, OpContext};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::banner::{
    Banner, BannerId, BannerPayload, BannerVersion, FeatureId, PayloadValidationError, TagId,
    INITIAL_VERSION, MAX_RETAINED_VERSIONS,
};
pub use repo::banner_repo::{
    BannerFilter, BannerLookup, BannerRepository, RepoError, RepoResult, SqliteBannerRepository,
};
pub use service::banner_service::{BannerService, BannerServiceError, ErrorKind, ServiceResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
