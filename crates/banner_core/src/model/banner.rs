//! Banner, version snapshot and write payload shapes.
//!
//! # Responsibility
//! - Carry banner state between the store, the service and callers.
//! - Validate create payloads before any storage access.
//!
//! # Invariants
//! - `content` is an opaque byte blob; core never interprets it.
//! - `total_versions` stays within `0..=MAX_RETAINED_VERSIONS`.
//! - A zero tag/feature id means "not specified".

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned banner identifier.
pub type BannerId = i64;
/// Targeting dimension identifying a user segment.
pub type TagId = i64;
/// Targeting dimension identifying a product surface.
pub type FeatureId = i64;

/// Size of the sliding snapshot window kept per banner.
pub const MAX_RETAINED_VERSIONS: i64 = 3;

/// Version number assigned to a freshly created banner.
pub const INITIAL_VERSION: i64 = 1;

/// Full banner read model used by filtered listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Banner {
    pub banner_id: BannerId,
    /// Tag ids in targeting insertion order.
    pub tag_ids: Vec<TagId>,
    /// Feature of the first targeting row, `0` when the banner has none.
    pub feature_id: FeatureId,
    pub content: Vec<u8>,
    pub is_active: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds.
    pub updated_at: i64,
    pub current_version: i64,
    pub total_versions: i64,
}

/// Content snapshot of one banner at a given version.
///
/// Also used as the projection of the banner's current state, in which case
/// `version` equals the banner's `current_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerVersion {
    pub banner_id: BannerId,
    pub version: i64,
    pub content: Vec<u8>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Write-side payload for create and partial update.
///
/// Every field may be absent. On update an absent field leaves the stored
/// value untouched; `is_active` distinguishes absent from explicit `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerPayload {
    #[serde(default)]
    pub tag_ids: Option<Vec<TagId>>,
    /// `0` means not specified.
    #[serde(default)]
    pub feature_id: FeatureId,
    #[serde(default)]
    pub content: Option<Vec<u8>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl BannerPayload {
    /// Creates a payload carrying every field required by banner creation.
    pub fn new(
        tag_ids: Vec<TagId>,
        feature_id: FeatureId,
        content: impl Into<Vec<u8>>,
        is_active: bool,
    ) -> Self {
        Self {
            tag_ids: Some(tag_ids),
            feature_id,
            content: Some(content.into()),
            is_active: Some(is_active),
        }
    }

    /// Sets replacement content.
    pub fn with_content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Sets an explicit activity flag.
    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    /// Sets the full replacement tag list.
    pub fn with_tags(mut self, tag_ids: Vec<TagId>) -> Self {
        self.tag_ids = Some(tag_ids);
        self
    }

    /// Sets the feature id.
    pub fn with_feature(mut self, feature_id: FeatureId) -> Self {
        self.feature_id = feature_id;
        self
    }

    /// Checks that the payload is complete enough to create a banner.
    ///
    /// Fields are checked in a fixed order and the first missing one is
    /// reported.
    pub fn validate_for_create(&self) -> Result<(), PayloadValidationError> {
        self.creation_fields().map(|_| ())
    }

    /// Validates for creation and borrows the required fields.
    pub fn creation_fields(&self) -> Result<CreationFields<'_>, PayloadValidationError> {
        let content = self
            .content
            .as_deref()
            .ok_or(PayloadValidationError::MissingContent)?;
        let is_active = self
            .is_active
            .ok_or(PayloadValidationError::MissingActiveFlag)?;
        let tag_ids = self
            .tag_ids
            .as_deref()
            .ok_or(PayloadValidationError::MissingTagIds)?;
        if self.feature_id == 0 {
            return Err(PayloadValidationError::MissingFeatureId);
        }
        Ok(CreationFields {
            tag_ids,
            feature_id: self.feature_id,
            content,
            is_active,
        })
    }
}

/// Borrowed view of a payload that passed create validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationFields<'a> {
    pub tag_ids: &'a [TagId],
    pub feature_id: FeatureId,
    pub content: &'a [u8],
    pub is_active: bool,
}

/// Rejection reasons for incomplete write payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadValidationError {
    MissingContent,
    MissingActiveFlag,
    MissingTagIds,
    MissingFeatureId,
    /// New targeting rows need a feature but neither the payload nor the
    /// banner's existing rows provide one.
    UnresolvedFeature,
}

impl Display for PayloadValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingContent => write!(f, "payload has no content"),
            Self::MissingActiveFlag => write!(f, "payload has no explicit is_active value"),
            Self::MissingTagIds => write!(f, "payload has no tag id list"),
            Self::MissingFeatureId => write!(f, "payload has zero feature id"),
            Self::UnresolvedFeature => {
                write!(f, "cannot resolve feature id for new targeting rows")
            }
        }
    }
}

impl Error for PayloadValidationError {}

/// Builds the revision cache key for one targeting pair.
pub fn targeting_cache_key(tag_id: TagId, feature_id: FeatureId) -> String {
    format!("{tag_id}-{feature_id}")
}
