use banner_core::db::open_db_in_memory;
use banner_core::{
    Banner, BannerFilter, BannerId, BannerLookup, BannerPayload, BannerRepository, Interrupted,
    OpContext, PayloadValidationError, RepoError, SqliteBannerRepository,
};
use rusqlite::Connection;
use std::time::{Duration, Instant};

fn listed_ids(banners: &[Banner]) -> Vec<BannerId> {
    banners.iter().map(|banner| banner.banner_id).collect()
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table};");
    conn.query_row(&sql, [], |row| row.get(0)).unwrap()
}

#[test]
fn user_read_requires_active_banner_and_admin_read_does_not() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    repo.create_banner(
        &ctx,
        &BannerPayload::new(vec![1], 10, br#"{"title":"on"}"#.to_vec(), true),
    )
    .unwrap();
    repo.create_banner(&ctx, &BannerPayload::new(vec![2], 10, b"off".to_vec(), false))
        .unwrap();

    assert_eq!(
        repo.read_user_banner(&ctx, 1, 10).unwrap(),
        br#"{"title":"on"}"#.to_vec()
    );
    let err = repo.read_user_banner(&ctx, 2, 10).unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound(BannerLookup::Targeting {
            tag_id: 2,
            feature_id: 10
        })
    ));
    assert_eq!(repo.read_banner(&ctx, 2, 10).unwrap(), b"off".to_vec());
}

#[test]
fn unknown_targeting_pair_is_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    assert!(matches!(
        repo.read_banner(&ctx, 4, 4).unwrap_err(),
        RepoError::NotFound(BannerLookup::Targeting { .. })
    ));
    assert!(matches!(
        repo.read_user_banner(&ctx, 4, 4).unwrap_err(),
        RepoError::NotFound(BannerLookup::Targeting { .. })
    ));
}

#[test]
fn create_is_atomic_when_targeting_conflicts() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
        let ctx = OpContext::background();

        let err = repo
            .create_banner(&ctx, &BannerPayload::new(vec![1, 1], 10, b"dup".to_vec(), true))
            .unwrap_err();
        assert!(matches!(err, RepoError::Constraint(_)));

        repo.create_banner(&ctx, &BannerPayload::new(vec![5], 10, b"first".to_vec(), true))
            .unwrap();
        let err = repo
            .create_banner(
                &ctx,
                &BannerPayload::new(vec![6, 5], 10, b"second".to_vec(), true),
            )
            .unwrap_err();
        assert!(matches!(err, RepoError::Constraint(_)));
    }

    assert_eq!(count_rows(&conn, "banner"), 1);
    assert_eq!(count_rows(&conn, "targeting"), 1);
}

#[test]
fn create_rejects_incomplete_payload() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
        let ctx = OpContext::background();
        let payload = BannerPayload {
            content: None,
            ..BannerPayload::new(vec![1], 1, b"x".to_vec(), true)
        };

        let err = repo.create_banner(&ctx, &payload).unwrap_err();
        assert!(matches!(
            err,
            RepoError::Validation(PayloadValidationError::MissingContent)
        ));
    }
    assert_eq!(count_rows(&conn, "banner"), 0);
}

#[test]
fn filter_applies_independent_tag_and_feature_filters() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let first = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1, 2], 10, b"a".to_vec(), true))
        .unwrap();
    let second = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1], 20, b"b".to_vec(), false))
        .unwrap();
    let third = repo
        .create_banner(&ctx, &BannerPayload::new(vec![3], 10, b"c".to_vec(), true))
        .unwrap();

    let all = repo
        .read_filter_banners(&ctx, &BannerFilter::default())
        .unwrap();
    assert_eq!(listed_ids(&all), vec![first, second, third]);
    assert_eq!(all[0].tag_ids, vec![1, 2]);
    assert_eq!(all[0].feature_id, 10);
    assert_eq!(all[0].content, b"a".to_vec());
    assert!(all[0].is_active);
    assert!(!all[1].is_active);
    assert_eq!(all[0].current_version, 1);
    assert_eq!(all[0].total_versions, 0);
    assert!(all[0].created_at > 0);

    let by_tag = BannerFilter {
        tag_id: 1,
        ..BannerFilter::default()
    };
    assert_eq!(
        listed_ids(&repo.read_filter_banners(&ctx, &by_tag).unwrap()),
        vec![first, second]
    );

    let by_feature = BannerFilter {
        feature_id: 10,
        ..BannerFilter::default()
    };
    assert_eq!(
        listed_ids(&repo.read_filter_banners(&ctx, &by_feature).unwrap()),
        vec![first, third]
    );

    let by_pair = BannerFilter {
        tag_id: 1,
        feature_id: 10,
        ..BannerFilter::default()
    };
    assert_eq!(
        listed_ids(&repo.read_filter_banners(&ctx, &by_pair).unwrap()),
        vec![first]
    );
}

#[test]
fn filter_paginates_distinct_banner_ids() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let mut ids = Vec::new();
    for (idx, tags) in [vec![1, 2], vec![3], vec![4, 5, 6]].into_iter().enumerate() {
        let content = format!("banner {idx}").into_bytes();
        ids.push(
            repo.create_banner(&ctx, &BannerPayload::new(tags, 7, content, true))
                .unwrap(),
        );
    }

    let page = |limit, offset| {
        let filter = BannerFilter {
            limit,
            offset,
            ..BannerFilter::default()
        };
        listed_ids(&repo.read_filter_banners(&ctx, &filter).unwrap())
    };

    assert_eq!(page(2, 0), vec![ids[0], ids[1]]);
    assert_eq!(page(2, 1), vec![ids[1], ids[2]]);
    assert_eq!(page(0, 2), vec![ids[2]]);
    assert_eq!(page(0, 3), Vec::<BannerId>::new());
}

#[test]
fn filter_with_tag_feature_and_offset_is_always_empty() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();
    repo.create_banner(&ctx, &BannerPayload::new(vec![1], 2, b"x".to_vec(), true))
        .unwrap();

    let filter = BannerFilter {
        tag_id: 1,
        feature_id: 2,
        limit: 10,
        offset: 5,
    };
    assert!(repo.read_filter_banners(&ctx, &filter).unwrap().is_empty());

    let without_offset = BannerFilter {
        offset: 0,
        ..filter
    };
    assert_eq!(
        repo.read_filter_banners(&ctx, &without_offset)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn partial_update_keeps_absent_fields() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();
    let id = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1], 10, b"keep".to_vec(), true))
        .unwrap();

    repo.update_banner(&ctx, id, &BannerPayload::default().with_active(false))
        .unwrap();

    assert_eq!(repo.read_banner(&ctx, 1, 10).unwrap(), b"keep".to_vec());
    assert!(matches!(
        repo.read_user_banner(&ctx, 1, 10).unwrap_err(),
        RepoError::NotFound(_)
    ));
    assert!(repo.read_old_versions(&ctx, id).unwrap().is_empty());

    repo.update_banner(&ctx, id, &BannerPayload::default()).unwrap();
    assert!(matches!(
        repo.read_user_banner(&ctx, 1, 10).unwrap_err(),
        RepoError::NotFound(_)
    ));

    repo.update_banner(&ctx, id, &BannerPayload::default().with_active(true))
        .unwrap();
    assert_eq!(repo.read_user_banner(&ctx, 1, 10).unwrap(), b"keep".to_vec());
}

#[test]
fn update_of_missing_banner_is_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let err = repo
        .update_banner(&ctx, 999, &BannerPayload::default().with_active(true))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(BannerLookup::Id(999))));

    let err = repo
        .update_banner(&ctx, 999, &BannerPayload::default().with_content("x"))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound(BannerLookup::Id(999))));
}

#[test]
fn delete_cascades_targeting_and_hides_banner() {
    let mut conn = open_db_in_memory().unwrap();
    let (deleted, kept) = {
        let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
        let ctx = OpContext::background();
        let deleted = repo
            .create_banner(&ctx, &BannerPayload::new(vec![1, 2], 10, b"a".to_vec(), true))
            .unwrap();
        let kept = repo
            .create_banner(&ctx, &BannerPayload::new(vec![3], 10, b"b".to_vec(), true))
            .unwrap();

        repo.delete_banner(&ctx, deleted).unwrap();

        assert!(matches!(
            repo.read_banner(&ctx, 1, 10).unwrap_err(),
            RepoError::NotFound(_)
        ));
        let listed = repo
            .read_filter_banners(&ctx, &BannerFilter::default())
            .unwrap();
        assert_eq!(listed_ids(&listed), vec![kept]);

        let err = repo.delete_banner(&ctx, deleted).unwrap_err();
        assert!(matches!(err, RepoError::NotFound(BannerLookup::Id(id)) if id == deleted));
        (deleted, kept)
    };

    let remaining: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM targeting WHERE banner_id = ?1;",
            [deleted],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(kept > deleted);
}

#[test]
fn cancelled_context_aborts_writes_without_side_effects() {
    let mut conn = open_db_in_memory().unwrap();
    {
        let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
        let live = OpContext::background();
        let id = repo
            .create_banner(&live, &BannerPayload::new(vec![1], 10, b"a".to_vec(), true))
            .unwrap();

        let cancelled = OpContext::background();
        cancelled.cancel_handle().cancel();
        let err = repo
            .create_banner(
                &cancelled,
                &BannerPayload::new(vec![2], 10, b"b".to_vec(), true),
            )
            .unwrap_err();
        assert!(matches!(err, RepoError::Interrupted(Interrupted::Cancelled)));

        let expired = OpContext::with_deadline(Instant::now() - Duration::from_millis(5));
        let err = repo
            .update_banner(&expired, id, &BannerPayload::default().with_content("changed"))
            .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Interrupted(Interrupted::DeadlineExceeded)
        ));
        assert!(matches!(
            repo.read_banner(&cancelled, 1, 10).unwrap_err(),
            RepoError::Interrupted(Interrupted::Cancelled)
        ));

        assert_eq!(repo.read_banner(&live, 1, 10).unwrap(), b"a".to_vec());
        assert!(repo.read_old_versions(&live, id).unwrap().is_empty());
    }
    assert_eq!(count_rows(&conn, "banner"), 1);
    assert_eq!(count_rows(&conn, "targeting"), 1);
}
