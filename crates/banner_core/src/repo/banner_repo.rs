//! Banner repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Resolve targeting pairs to banner content for user and admin reads.
//! - Create, partially update and delete banners together with their
//!   targeting rows, atomically.
//! - Expose version history projections and rollback.
//!
//! # Invariants
//! - User reads never return content of inactive banners.
//! - A content-changing update snapshots the replaced content first.
//! - An interrupted or failed write leaves no partial state behind.

use crate::context::{Interrupted, OpContext};
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::banner::{
    Banner, BannerId, BannerPayload, BannerVersion, CreationFields, FeatureId,
    PayloadValidationError, TagId, INITIAL_VERSION,
};
use crate::repo::{targeting, versions};
use log::{error, info, warn};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type RepoResult<T> = Result<T, RepoError>;

/// What a failed lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerLookup {
    Id(BannerId),
    Targeting {
        tag_id: TagId,
        feature_id: FeatureId,
    },
    Version {
        banner_id: BannerId,
        version: i64,
    },
}

impl Display for BannerLookup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "banner {id}"),
            Self::Targeting { tag_id, feature_id } => {
                write!(f, "banner for tag {tag_id} and feature {feature_id}")
            }
            Self::Version { banner_id, version } => {
                write!(f, "version {version} of banner {banner_id}")
            }
        }
    }
}

/// Errors from banner store operations.
#[derive(Debug)]
pub enum RepoError {
    /// Payload cannot be persisted as given.
    Validation(PayloadValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Banner, targeting pair or version does not exist.
    NotFound(BannerLookup),
    /// A (tag, feature) pair already targets a banner.
    Constraint(String),
    /// Caller cancelled the operation or its deadline passed.
    Interrupted(Interrupted),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(lookup) => write!(f, "not found: {lookup}"),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
            Self::Interrupted(reason) => write!(f, "{reason}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "banner repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted banner data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Interrupted(reason) => Some(reason),
            Self::NotFound(_)
            | Self::Constraint(_)
            | Self::UninitializedConnection { .. }
            | Self::InvalidData(_) => None,
        }
    }
}

impl RepoError {
    /// Short stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Db(_) => "db",
            Self::NotFound(_) => "not_found",
            Self::Constraint(_) => "constraint",
            Self::Interrupted(_) => "interrupted",
            Self::UninitializedConnection { .. } => "uninitialized",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl From<PayloadValidationError> for RepoError {
    fn from(value: PayloadValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<Interrupted> for RepoError {
    fn from(value: Interrupted) -> Self {
        Self::Interrupted(value)
    }
}

/// Filter and pagination options for banner listings.
///
/// Zero ids disable the corresponding filter; a zero limit means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BannerFilter {
    pub tag_id: TagId,
    pub feature_id: FeatureId,
    pub limit: u32,
    pub offset: u32,
}

/// Repository interface for banner persistence.
pub trait BannerRepository {
    /// Content of the banner targeted by the pair, only if active.
    fn read_user_banner(
        &self,
        ctx: &OpContext,
        tag_id: TagId,
        feature_id: FeatureId,
    ) -> RepoResult<Vec<u8>>;
    /// Content of the banner targeted by the pair, active or not.
    fn read_banner(
        &self,
        ctx: &OpContext,
        tag_id: TagId,
        feature_id: FeatureId,
    ) -> RepoResult<Vec<u8>>;
    /// Lists hydrated banners matching the filter.
    fn read_filter_banners(&self, ctx: &OpContext, filter: &BannerFilter)
        -> RepoResult<Vec<Banner>>;
    /// Creates a banner and its targeting rows in one transaction.
    fn create_banner(&mut self, ctx: &OpContext, payload: &BannerPayload) -> RepoResult<BannerId>;
    /// Applies a partial update in one transaction.
    fn update_banner(
        &mut self,
        ctx: &OpContext,
        banner_id: BannerId,
        payload: &BannerPayload,
    ) -> RepoResult<()>;
    /// Deletes a banner; targeting and version rows cascade.
    fn delete_banner(&mut self, ctx: &OpContext, banner_id: BannerId) -> RepoResult<()>;
    /// Projects the banner's current content as a version record.
    fn read_current_banner(&self, ctx: &OpContext, banner_id: BannerId)
        -> RepoResult<BannerVersion>;
    /// Retained snapshots ordered by version ascending.
    fn read_old_versions(
        &self,
        ctx: &OpContext,
        banner_id: BannerId,
    ) -> RepoResult<Vec<BannerVersion>>;
    /// Rolls the banner back to a retained snapshot.
    fn update_version_of_banner(
        &mut self,
        ctx: &OpContext,
        banner_id: BannerId,
        version: i64,
    ) -> RepoResult<()>;
}

/// SQLite-backed banner repository over one request-scoped connection.
pub struct SqliteBannerRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteBannerRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when migrations have not been applied.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        let actual_version = current_user_version(conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    fn begin(&mut self, ctx: &OpContext) -> RepoResult<Transaction<'_>> {
        ctx.check()?;
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    fn create_in_tx(
        &mut self,
        ctx: &OpContext,
        fields: &CreationFields<'_>,
    ) -> RepoResult<BannerId> {
        let tx = self.begin(ctx)?;
        tx.execute(
            "INSERT INTO banner (content, is_active, current_version) VALUES (?1, ?2, ?3);",
            params![fields.content, bool_to_int(fields.is_active), INITIAL_VERSION],
        )?;
        let banner_id = tx.last_insert_rowid();

        for &tag_id in fields.tag_ids {
            ctx.check()?;
            targeting::insert_row(&tx, banner_id, tag_id, fields.feature_id)?;
        }

        ctx.check()?;
        tx.commit()?;
        Ok(banner_id)
    }

    fn update_in_tx(
        &mut self,
        ctx: &OpContext,
        banner_id: BannerId,
        payload: &BannerPayload,
    ) -> RepoResult<()> {
        let tx = self.begin(ctx)?;

        if payload.content.is_some() {
            versions::snapshot_current(&tx, ctx, banner_id)?;
        }

        ctx.check()?;
        let changed = tx.execute(
            "UPDATE banner
             SET
                content = COALESCE(?1, content),
                is_active = COALESCE(?2, is_active),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE banner_id = ?3;",
            params![
                payload.content.as_deref(),
                payload.is_active.map(bool_to_int),
                banner_id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(BannerLookup::Id(banner_id)));
        }

        if let Some(tag_ids) = payload.tag_ids.as_deref() {
            targeting::reconcile_by_position(&tx, ctx, banner_id, tag_ids, payload.feature_id)?;
        } else if payload.feature_id != 0 {
            targeting::retarget_feature(&tx, ctx, banner_id, payload.feature_id)?;
        }

        ctx.check()?;
        tx.commit()?;
        Ok(())
    }

    fn delete_row(&self, ctx: &OpContext, banner_id: BannerId) -> RepoResult<()> {
        ctx.check()?;
        let changed = self
            .conn
            .execute("DELETE FROM banner WHERE banner_id = ?1;", [banner_id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(BannerLookup::Id(banner_id)));
        }
        Ok(())
    }

    fn rollback_in_tx(
        &mut self,
        ctx: &OpContext,
        banner_id: BannerId,
        version: i64,
    ) -> RepoResult<usize> {
        let tx = self.begin(ctx)?;
        let discarded = versions::restore_snapshot(&tx, ctx, banner_id, version)?;
        ctx.check()?;
        tx.commit()?;
        Ok(discarded)
    }
}

impl BannerRepository for SqliteBannerRepository<'_> {
    fn read_user_banner(
        &self,
        ctx: &OpContext,
        tag_id: TagId,
        feature_id: FeatureId,
    ) -> RepoResult<Vec<u8>> {
        read_targeted_content(self.conn, ctx, tag_id, feature_id, true)
    }

    fn read_banner(
        &self,
        ctx: &OpContext,
        tag_id: TagId,
        feature_id: FeatureId,
    ) -> RepoResult<Vec<u8>> {
        read_targeted_content(self.conn, ctx, tag_id, feature_id, false)
    }

    fn read_filter_banners(
        &self,
        ctx: &OpContext,
        filter: &BannerFilter,
    ) -> RepoResult<Vec<Banner>> {
        // Both filters plus an offset yield nothing; kept for API compatibility.
        if filter.tag_id != 0 && filter.feature_id != 0 && filter.offset != 0 {
            return Ok(Vec::new());
        }

        ctx.check()?;
        let tx = self.conn.unchecked_transaction()?;

        let mut sql = String::from("SELECT DISTINCT banner_id FROM targeting WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        if filter.tag_id != 0 {
            sql.push_str(" AND tag_id = ?");
            bind_values.push(Value::Integer(filter.tag_id));
        }
        if filter.feature_id != 0 {
            sql.push_str(" AND feature_id = ?");
            bind_values.push(Value::Integer(filter.feature_id));
        }
        sql.push_str(" ORDER BY banner_id ASC");

        if filter.limit > 0 {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(filter.limit)));
            if filter.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(filter.offset)));
            }
        } else if filter.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(filter.offset)));
        }

        let ids = {
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(bind_values), |row| row.get::<_, i64>(0))?;
            rows.collect::<Result<Vec<BannerId>, _>>()?
        };

        let mut banners = Vec::with_capacity(ids.len());
        for banner_id in ids {
            ctx.check()?;
            if let Some(banner) = load_banner(&tx, banner_id)? {
                banners.push(banner);
            }
        }

        Ok(banners)
    }

    fn create_banner(&mut self, ctx: &OpContext, payload: &BannerPayload) -> RepoResult<BannerId> {
        let started_at = Instant::now();
        let fields = payload.creation_fields()?;

        let result = self.create_in_tx(ctx, &fields);

        match &result {
            Ok(banner_id) => info!(
                "event=banner_create module=repo status=ok banner_id={banner_id} tag_count={} duration_ms={}",
                fields.tag_ids.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_write_error("banner_create", None, started_at, err),
        }
        result
    }

    fn update_banner(
        &mut self,
        ctx: &OpContext,
        banner_id: BannerId,
        payload: &BannerPayload,
    ) -> RepoResult<()> {
        let started_at = Instant::now();

        let result = self.update_in_tx(ctx, banner_id, payload);

        match &result {
            Ok(()) => info!(
                "event=banner_update module=repo status=ok banner_id={banner_id} content_changed={} tags_changed={} duration_ms={}",
                payload.content.is_some(),
                payload.tag_ids.is_some(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_write_error("banner_update", Some(banner_id), started_at, err),
        }
        result
    }

    fn delete_banner(&mut self, ctx: &OpContext, banner_id: BannerId) -> RepoResult<()> {
        let started_at = Instant::now();

        let result = self.delete_row(ctx, banner_id);

        match &result {
            Ok(()) => info!(
                "event=banner_delete module=repo status=ok banner_id={banner_id} duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_write_error("banner_delete", Some(banner_id), started_at, err),
        }
        result
    }

    fn read_current_banner(
        &self,
        ctx: &OpContext,
        banner_id: BannerId,
    ) -> RepoResult<BannerVersion> {
        ctx.check()?;
        self.conn
            .query_row(
                "SELECT banner_id, current_version AS version, content, created_at, updated_at
                 FROM banner
                 WHERE banner_id = ?1;",
                [banner_id],
                parse_version_row,
            )
            .optional()?
            .ok_or(RepoError::NotFound(BannerLookup::Id(banner_id)))
    }

    fn read_old_versions(
        &self,
        ctx: &OpContext,
        banner_id: BannerId,
    ) -> RepoResult<Vec<BannerVersion>> {
        ctx.check()?;
        if !banner_exists(self.conn, banner_id)? {
            return Err(RepoError::NotFound(BannerLookup::Id(banner_id)));
        }
        versions::list_snapshots(self.conn, banner_id)
    }

    fn update_version_of_banner(
        &mut self,
        ctx: &OpContext,
        banner_id: BannerId,
        version: i64,
    ) -> RepoResult<()> {
        let started_at = Instant::now();

        match self.rollback_in_tx(ctx, banner_id, version) {
            Ok(discarded) => {
                info!(
                    "event=banner_rollback module=repo status=ok banner_id={banner_id} version={version} discarded_versions={discarded} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                log_write_error("banner_rollback", Some(banner_id), started_at, &err);
                Err(err)
            }
        }
    }
}

fn read_targeted_content(
    conn: &Connection,
    ctx: &OpContext,
    tag_id: TagId,
    feature_id: FeatureId,
    active_only: bool,
) -> RepoResult<Vec<u8>> {
    let lookup = BannerLookup::Targeting { tag_id, feature_id };

    ctx.check()?;
    let banner_id: BannerId = conn
        .query_row(
            "SELECT banner_id FROM targeting WHERE tag_id = ?1 AND feature_id = ?2;",
            params![tag_id, feature_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(RepoError::NotFound(lookup))?;

    ctx.check()?;
    conn.query_row(
        "SELECT content
         FROM banner
         WHERE banner_id = ?1
           AND (?2 = 0 OR is_active = 1);",
        params![banner_id, bool_to_int(active_only)],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(RepoError::NotFound(lookup))
}

fn load_banner(conn: &Connection, banner_id: BannerId) -> RepoResult<Option<Banner>> {
    let mut stmt = conn.prepare(
        "SELECT
            banner_id,
            content,
            is_active,
            created_at,
            updated_at,
            current_version,
            total_versions
         FROM banner
         WHERE banner_id = ?1;",
    )?;

    let mut rows = stmt.query([banner_id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let targets = targeting::load_rows(conn, banner_id)?;
    Ok(Some(Banner {
        banner_id: row.get("banner_id")?,
        tag_ids: targets.iter().map(|target| target.tag_id).collect(),
        feature_id: targets.first().map_or(0, |target| target.feature_id),
        content: row.get("content")?,
        is_active: parse_bool(row.get("is_active")?, "banner.is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        current_version: row.get("current_version")?,
        total_versions: row.get("total_versions")?,
    }))
}

fn banner_exists(conn: &Connection, banner_id: BannerId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM banner WHERE banner_id = ?1);",
        [banner_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(super) fn parse_version_row(row: &Row<'_>) -> rusqlite::Result<BannerVersion> {
    Ok(BannerVersion {
        banner_id: row.get("banner_id")?,
        version: row.get("version")?,
        content: row.get("content")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn log_write_error(
    event: &str,
    banner_id: Option<BannerId>,
    started_at: Instant,
    err: &RepoError,
) {
    let banner = banner_id.map_or_else(|| "none".to_string(), |id| id.to_string());
    let duration_ms = started_at.elapsed().as_millis();
    match err {
        RepoError::Db(_) | RepoError::InvalidData(_) | RepoError::UninitializedConnection { .. } => {
            error!(
                "event={event} module=repo status=error banner_id={banner} duration_ms={duration_ms} error_code={} error={}",
                err.code(),
                err
            );
        }
        _ => warn!(
            "event={event} module=repo status=rejected banner_id={banner} duration_ms={duration_ms} error_code={}",
            err.code()
        ),
    }
}
