//! Banner use-case service.
//!
//! # Responsibility
//! - Serve targeting reads through the revision cache with the admin/user
//!   visibility split.
//! - Validate create payloads before any storage access.
//! - Delegate writes and version operations to the banner repository.
//!
//! # Invariants
//! - Admin reads always come from the store and refresh the cache.
//! - User reads only fall back to the store on a cache miss or when the
//!   caller asks for the last revision, and only see active banners.
//! - Repository errors reach callers unchanged in meaning.

use crate::cache::backend::CacheBackend;
use crate::cache::revision_cache::RevisionCache;
use crate::context::OpContext;
use crate::model::banner::{
    targeting_cache_key, Banner, BannerId, BannerPayload, BannerVersion, FeatureId,
    PayloadValidationError, TagId,
};
use crate::repo::banner_repo::{BannerFilter, BannerLookup, BannerRepository, RepoError};
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, BannerServiceError>;

/// Coarse error classes the request layer maps to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Constraint,
    Transient,
}

/// Service error for banner use-cases.
#[derive(Debug)]
pub enum BannerServiceError {
    /// Payload rejected before storage access.
    Validation(PayloadValidationError),
    /// Banner, targeting pair or version does not exist.
    NotFound(BannerLookup),
    /// Duplicate (tag, feature) targeting.
    Constraint(String),
    /// Any other persistence failure.
    Repo(RepoError),
}

impl BannerServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Constraint(_) => ErrorKind::Constraint,
            Self::Repo(_) => ErrorKind::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl Display for BannerServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid banner payload: {err}"),
            Self::NotFound(lookup) => write!(f, "not found: {lookup}"),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BannerServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NotFound(_) | Self::Constraint(_) => None,
        }
    }
}

impl From<RepoError> for BannerServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound(lookup) => Self::NotFound(lookup),
            RepoError::Constraint(message) => Self::Constraint(message),
            other => Self::Repo(other),
        }
    }
}

impl From<PayloadValidationError> for BannerServiceError {
    fn from(value: PayloadValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Banner service facade over a repository and a shared revision cache.
pub struct BannerService<R: BannerRepository, B: CacheBackend> {
    repo: R,
    cache: RevisionCache<B>,
}

impl<R: BannerRepository, B: CacheBackend> BannerService<R, B> {
    /// Creates a service from its collaborators.
    pub fn new(repo: R, cache: RevisionCache<B>) -> Self {
        Self { repo, cache }
    }

    /// Resolves the content targeted by a (tag, feature) pair.
    ///
    /// The cache is only consulted for user reads when `use_last_revision`
    /// is false. Admin reads see inactive banners and overwrite the shared
    /// cache entry for the pair.
    pub fn get_banner(
        &self,
        ctx: &OpContext,
        tag_id: TagId,
        feature_id: FeatureId,
        use_last_revision: bool,
        is_admin: bool,
    ) -> ServiceResult<Vec<u8>> {
        let key = targeting_cache_key(tag_id, feature_id);

        if is_admin {
            let content = self.repo.read_banner(ctx, tag_id, feature_id)?;
            self.cache.set(&key, &content);
            debug!("event=banner_get module=service source=store scope=admin key={key}");
            return Ok(content);
        }

        if !use_last_revision {
            if let Some(content) = self.cache.get(&key) {
                debug!("event=banner_get module=service source=cache scope=user key={key}");
                return Ok(content);
            }
        }

        let content = self.repo.read_user_banner(ctx, tag_id, feature_id)?;
        self.cache.set(&key, &content);
        debug!("event=banner_get module=service source=store scope=user key={key}");
        Ok(content)
    }

    /// Lists banners by optional tag/feature filter with pagination.
    pub fn get_filter_banners(
        &self,
        ctx: &OpContext,
        filter: &BannerFilter,
    ) -> ServiceResult<Vec<Banner>> {
        Ok(self.repo.read_filter_banners(ctx, filter)?)
    }

    /// Creates a banner from a complete payload.
    ///
    /// # Errors
    /// - `Validation` without touching storage when content, activity flag,
    ///   tag list or feature id is missing.
    pub fn add_banner(
        &mut self,
        ctx: &OpContext,
        payload: &BannerPayload,
    ) -> ServiceResult<BannerId> {
        if let Err(err) = payload.validate_for_create() {
            warn!("event=banner_add module=service status=rejected reason={err}");
            return Err(err.into());
        }
        Ok(self.repo.create_banner(ctx, payload)?)
    }

    /// Applies a partial update; absent payload fields are left untouched.
    pub fn update_banner(
        &mut self,
        ctx: &OpContext,
        banner_id: BannerId,
        payload: &BannerPayload,
    ) -> ServiceResult<()> {
        Ok(self.repo.update_banner(ctx, banner_id, payload)?)
    }

    pub fn delete_banner(&mut self, ctx: &OpContext, banner_id: BannerId) -> ServiceResult<()> {
        Ok(self.repo.delete_banner(ctx, banner_id)?)
    }

    /// Returns the banner's current content as a version record.
    pub fn get_current_banner(
        &self,
        ctx: &OpContext,
        banner_id: BannerId,
    ) -> ServiceResult<BannerVersion> {
        Ok(self.repo.read_current_banner(ctx, banner_id)?)
    }

    /// Returns retained snapshots ordered by version.
    pub fn get_old_banners(
        &self,
        ctx: &OpContext,
        banner_id: BannerId,
    ) -> ServiceResult<Vec<BannerVersion>> {
        Ok(self.repo.read_old_versions(ctx, banner_id)?)
    }

    /// Rolls the banner back to a retained version.
    pub fn change_version_of_banner(
        &mut self,
        ctx: &OpContext,
        banner_id: BannerId,
        version: i64,
    ) -> ServiceResult<()> {
        Ok(self.repo.update_version_of_banner(ctx, banner_id, version)?)
    }
}
