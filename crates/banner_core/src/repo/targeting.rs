//! Targeting row persistence and positional reconciliation.
//!
//! # Invariants
//! - A (tag, feature) pair targets at most one banner; violations surface
//!   as `RepoError::Constraint`.
//! - Row position is insertion order (`rowid`).
//! - Reconciliation pairs existing and requested rows by index, not by tag
//!   value, so reordering a tag list repoints existing rows.

use crate::context::OpContext;
use crate::db::DbError;
use crate::model::banner::{BannerId, FeatureId, PayloadValidationError, TagId};
use crate::repo::banner_repo::{RepoError, RepoResult};
use rusqlite::{params, Connection, Transaction};

/// One persisted targeting association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct TargetRow {
    pub rowid: i64,
    pub tag_id: TagId,
    pub feature_id: FeatureId,
}

/// Loads a banner's targeting rows in position order.
pub(super) fn load_rows(conn: &Connection, banner_id: BannerId) -> RepoResult<Vec<TargetRow>> {
    let mut stmt = conn.prepare(
        "SELECT rowid, tag_id, feature_id
         FROM targeting
         WHERE banner_id = ?1
         ORDER BY rowid ASC;",
    )?;
    let rows = stmt.query_map([banner_id], |row| {
        Ok(TargetRow {
            rowid: row.get(0)?,
            tag_id: row.get(1)?,
            feature_id: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub(super) fn insert_row(
    tx: &Transaction<'_>,
    banner_id: BannerId,
    tag_id: TagId,
    feature_id: FeatureId,
) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO targeting (banner_id, tag_id, feature_id) VALUES (?1, ?2, ?3);",
        params![banner_id, tag_id, feature_id],
    )
    .map_err(|err| classify(err, tag_id, feature_id))?;
    Ok(())
}

/// Rewrites a banner's targeting rows to match `tag_ids` position by position.
///
/// A zero `feature_id` keeps each updated row's feature; appended rows then
/// inherit the feature of the banner's first existing row.
pub(super) fn reconcile_by_position(
    tx: &Transaction<'_>,
    ctx: &OpContext,
    banner_id: BannerId,
    tag_ids: &[TagId],
    feature_id: FeatureId,
) -> RepoResult<()> {
    ctx.check()?;
    let existing = load_rows(tx, banner_id)?;
    let shared = existing.len().min(tag_ids.len());

    // Dropped rows go first so a kept row may take over a dropped row's pair.
    for row in &existing[shared..] {
        ctx.check()?;
        tx.execute("DELETE FROM targeting WHERE rowid = ?1;", [row.rowid])?;
    }

    for (row, &tag_id) in existing.iter().zip(tag_ids) {
        ctx.check()?;
        let target_feature = if feature_id != 0 {
            feature_id
        } else {
            row.feature_id
        };
        tx.execute(
            "UPDATE targeting SET tag_id = ?2, feature_id = ?3 WHERE rowid = ?1;",
            params![row.rowid, tag_id, target_feature],
        )
        .map_err(|err| classify(err, tag_id, target_feature))?;
    }

    if tag_ids.len() > shared {
        let appended_feature = if feature_id != 0 {
            feature_id
        } else {
            existing
                .first()
                .map(|row| row.feature_id)
                .ok_or(RepoError::Validation(PayloadValidationError::UnresolvedFeature))?
        };
        for &tag_id in &tag_ids[shared..] {
            ctx.check()?;
            insert_row(tx, banner_id, tag_id, appended_feature)?;
        }
    }

    Ok(())
}

/// Moves every targeting row of the banner to `feature_id`.
pub(super) fn retarget_feature(
    tx: &Transaction<'_>,
    ctx: &OpContext,
    banner_id: BannerId,
    feature_id: FeatureId,
) -> RepoResult<usize> {
    ctx.check()?;
    tx.execute(
        "UPDATE targeting SET feature_id = ?2 WHERE banner_id = ?1;",
        params![banner_id, feature_id],
    )
    .map_err(|err| classify(err, 0, feature_id))
}

fn classify(err: rusqlite::Error, tag_id: TagId, feature_id: FeatureId) -> RepoError {
    let err = DbError::from(err);
    if !err.is_constraint_violation() {
        return RepoError::Db(err);
    }
    if tag_id == 0 {
        RepoError::Constraint(format!(
            "feature {feature_id} is already targeted for one of the banner's tags"
        ))
    } else {
        RepoError::Constraint(format!(
            "tag {tag_id} and feature {feature_id} already target a banner"
        ))
    }
}
