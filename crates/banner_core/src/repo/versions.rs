//! Version retention and rollback on the `banner_version` table.
//!
//! # Invariants
//! - A snapshot carries the version number and content being replaced.
//! - At most `MAX_RETAINED_VERSIONS` snapshots survive per banner; the
//!   oldest one is evicted first.
//! - `banner.total_versions` always equals the number of retained rows.

use crate::context::OpContext;
use crate::model::banner::{BannerId, BannerVersion, MAX_RETAINED_VERSIONS};
use crate::repo::banner_repo::{parse_version_row, BannerLookup, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

struct CurrentState {
    version: i64,
    total_versions: i64,
    content: Vec<u8>,
    created_at: i64,
    updated_at: i64,
}

/// Snapshots the banner's current content before it is overwritten.
///
/// Returns the version number assigned to the snapshot.
pub(super) fn snapshot_current(
    tx: &Transaction<'_>,
    ctx: &OpContext,
    banner_id: BannerId,
) -> RepoResult<i64> {
    ctx.check()?;
    let current = tx
        .query_row(
            "SELECT current_version, total_versions, content, created_at, updated_at
             FROM banner
             WHERE banner_id = ?1;",
            [banner_id],
            |row| {
                Ok(CurrentState {
                    version: row.get(0)?,
                    total_versions: row.get(1)?,
                    content: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()?
        .ok_or(RepoError::NotFound(BannerLookup::Id(banner_id)))?;

    ctx.check()?;
    tx.execute(
        "INSERT INTO banner_version (banner_id, version, content, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            banner_id,
            current.version,
            current.content,
            current.created_at,
            current.updated_at,
        ],
    )?;

    if current.total_versions >= MAX_RETAINED_VERSIONS {
        ctx.check()?;
        tx.execute(
            "DELETE FROM banner_version
             WHERE banner_id = ?1
               AND version = (
                    SELECT MIN(version) FROM banner_version WHERE banner_id = ?1
               );",
            [banner_id],
        )?;
    }

    ctx.check()?;
    tx.execute(
        "UPDATE banner
         SET current_version = ?2, total_versions = ?3
         WHERE banner_id = ?1;",
        params![
            banner_id,
            current.version + 1,
            (current.total_versions + 1).min(MAX_RETAINED_VERSIONS),
        ],
    )?;

    Ok(current.version)
}

/// Restores the banner to snapshot `version`.
///
/// Every snapshot at or after `version` is discarded; returns how many.
pub(super) fn restore_snapshot(
    tx: &Transaction<'_>,
    ctx: &OpContext,
    banner_id: BannerId,
    version: i64,
) -> RepoResult<usize> {
    ctx.check()?;
    let snapshot = tx
        .query_row(
            "SELECT banner_id, version, content, created_at, updated_at
             FROM banner_version
             WHERE banner_id = ?1 AND version = ?2;",
            params![banner_id, version],
            parse_version_row,
        )
        .optional()?
        .ok_or(RepoError::NotFound(BannerLookup::Version { banner_id, version }))?;

    ctx.check()?;
    let discarded = tx.execute(
        "DELETE FROM banner_version WHERE banner_id = ?1 AND version >= ?2;",
        params![banner_id, version],
    )?;

    ctx.check()?;
    let changed = tx.execute(
        "UPDATE banner
         SET
            content = ?2,
            current_version = ?3,
            created_at = ?4,
            updated_at = ?5,
            total_versions = MAX(total_versions - ?6, 0)
         WHERE banner_id = ?1;",
        params![
            banner_id,
            snapshot.content,
            snapshot.version,
            snapshot.created_at,
            snapshot.updated_at,
            discarded as i64,
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound(BannerLookup::Id(banner_id)));
    }

    Ok(discarded)
}

/// Lists retained snapshots ordered by version ascending.
pub(super) fn list_snapshots(
    conn: &Connection,
    banner_id: BannerId,
) -> RepoResult<Vec<BannerVersion>> {
    let mut stmt = conn.prepare(
        "SELECT banner_id, version, content, created_at, updated_at
         FROM banner_version
         WHERE banner_id = ?1
         ORDER BY version ASC;",
    )?;
    let rows = stmt.query_map([banner_id], parse_version_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
