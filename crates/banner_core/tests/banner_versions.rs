use banner_core::db::open_db_in_memory;
use banner_core::{
    Banner, BannerFilter, BannerId, BannerLookup, BannerPayload, BannerRepository, OpContext,
    RepoError, SqliteBannerRepository, INITIAL_VERSION, MAX_RETAINED_VERSIONS,
};

fn banner_state<R: BannerRepository>(repo: &R, ctx: &OpContext, id: BannerId) -> Banner {
    repo.read_filter_banners(ctx, &BannerFilter::default())
        .unwrap()
        .into_iter()
        .find(|banner| banner.banner_id == id)
        .expect("banner should be listed")
}

fn snapshot_summary<R: BannerRepository>(
    repo: &R,
    ctx: &OpContext,
    id: BannerId,
) -> Vec<(i64, String)> {
    repo.read_old_versions(ctx, id)
        .unwrap()
        .into_iter()
        .map(|version| {
            (
                version.version,
                String::from_utf8(version.content).expect("utf-8 content"),
            )
        })
        .collect()
}

#[test]
fn content_update_snapshots_previous_content() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let id = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1, 2], 10, b"A".to_vec(), true))
        .unwrap();
    assert_eq!(repo.read_user_banner(&ctx, 1, 10).unwrap(), b"A".to_vec());
    let created = repo.read_current_banner(&ctx, id).unwrap();
    assert_eq!(created.version, INITIAL_VERSION);
    assert!(repo.read_old_versions(&ctx, id).unwrap().is_empty());

    repo.update_banner(&ctx, id, &BannerPayload::default().with_content("B"))
        .unwrap();

    let old = repo.read_old_versions(&ctx, id).unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].banner_id, id);
    assert_eq!(old[0].version, INITIAL_VERSION);
    assert_eq!(old[0].content, b"A".to_vec());
    assert_eq!(repo.read_user_banner(&ctx, 1, 10).unwrap(), b"B".to_vec());
    assert_eq!(repo.read_user_banner(&ctx, 2, 10).unwrap(), b"B".to_vec());

    let current = repo.read_current_banner(&ctx, id).unwrap();
    assert_eq!(current.version, INITIAL_VERSION + 1);
    assert_eq!(current.content, b"B".to_vec());
}

#[test]
fn retention_window_evicts_oldest_snapshot() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let id = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1], 1, b"v1".to_vec(), true))
        .unwrap();
    for (step, content) in ["v2", "v3", "v4", "v5"].into_iter().enumerate() {
        repo.update_banner(&ctx, id, &BannerPayload::default().with_content(content))
            .unwrap();
        let state = banner_state(&repo, &ctx, id);
        assert_eq!(state.current_version, step as i64 + 2);
        assert_eq!(
            state.total_versions,
            (step as i64 + 1).min(MAX_RETAINED_VERSIONS)
        );
    }

    assert_eq!(
        snapshot_summary(&repo, &ctx, id),
        vec![
            (2, "v2".to_string()),
            (3, "v3".to_string()),
            (4, "v4".to_string()),
        ]
    );
    let current = repo.read_current_banner(&ctx, id).unwrap();
    assert_eq!((current.version, current.content), (5, b"v5".to_vec()));
}

#[test]
fn update_without_content_does_not_snapshot() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let id = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1], 1, b"v1".to_vec(), true))
        .unwrap();
    repo.update_banner(
        &ctx,
        id,
        &BannerPayload::default().with_active(false).with_tags(vec![2]),
    )
    .unwrap();

    assert!(repo.read_old_versions(&ctx, id).unwrap().is_empty());
    let state = banner_state(&repo, &ctx, id);
    assert_eq!((state.current_version, state.total_versions), (1, 0));
}

#[test]
fn rollback_discards_newer_snapshots_and_reuses_version_number() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let id = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1], 1, b"v1".to_vec(), true))
        .unwrap();
    for content in ["v2", "v3", "v4", "v5"] {
        repo.update_banner(&ctx, id, &BannerPayload::default().with_content(content))
            .unwrap();
    }
    let target = repo
        .read_old_versions(&ctx, id)
        .unwrap()
        .into_iter()
        .find(|version| version.version == 3)
        .expect("version 3 should be retained");

    repo.update_version_of_banner(&ctx, id, 3).unwrap();

    let current = repo.read_current_banner(&ctx, id).unwrap();
    assert_eq!(current, target);
    assert_eq!(repo.read_user_banner(&ctx, 1, 1).unwrap(), b"v3".to_vec());
    assert_eq!(snapshot_summary(&repo, &ctx, id), vec![(2, "v2".to_string())]);
    assert_eq!(banner_state(&repo, &ctx, id).total_versions, 1);

    repo.update_banner(&ctx, id, &BannerPayload::default().with_content("v6"))
        .unwrap();
    assert_eq!(
        snapshot_summary(&repo, &ctx, id),
        vec![(2, "v2".to_string()), (3, "v3".to_string())]
    );
    let state = banner_state(&repo, &ctx, id);
    assert_eq!((state.current_version, state.total_versions), (4, 2));
}

#[test]
fn rollback_to_earliest_snapshot_clears_history() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let id = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1], 1, b"v1".to_vec(), true))
        .unwrap();
    repo.update_banner(&ctx, id, &BannerPayload::default().with_content("v2"))
        .unwrap();
    repo.update_banner(&ctx, id, &BannerPayload::default().with_content("v3"))
        .unwrap();

    repo.update_version_of_banner(&ctx, id, 1).unwrap();

    assert!(repo.read_old_versions(&ctx, id).unwrap().is_empty());
    let state = banner_state(&repo, &ctx, id);
    assert_eq!(state.content, b"v1".to_vec());
    assert_eq!((state.current_version, state.total_versions), (1, 0));
}

#[test]
fn rollback_to_unknown_version_is_not_found_and_changes_nothing() {
    let mut conn = open_db_in_memory().unwrap();
    let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    let id = repo
        .create_banner(&ctx, &BannerPayload::new(vec![1], 1, b"v1".to_vec(), true))
        .unwrap();
    repo.update_banner(&ctx, id, &BannerPayload::default().with_content("v2"))
        .unwrap();

    let err = repo.update_version_of_banner(&ctx, id, 7).unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound(BannerLookup::Version { version: 7, .. })
    ));
    let err = repo.update_version_of_banner(&ctx, id + 100, 1).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(BannerLookup::Version { .. })));

    assert_eq!(snapshot_summary(&repo, &ctx, id), vec![(1, "v1".to_string())]);
    assert_eq!(repo.read_banner(&ctx, 1, 1).unwrap(), b"v2".to_vec());
}

#[test]
fn version_projections_of_missing_banner_are_not_found() {
    let mut conn = open_db_in_memory().unwrap();
    let repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
    let ctx = OpContext::background();

    assert!(matches!(
        repo.read_current_banner(&ctx, 42).unwrap_err(),
        RepoError::NotFound(BannerLookup::Id(42))
    ));
    assert!(matches!(
        repo.read_old_versions(&ctx, 42).unwrap_err(),
        RepoError::NotFound(BannerLookup::Id(42))
    ));
}

#[test]
fn delete_removes_retained_snapshots() {
    let mut conn = open_db_in_memory().unwrap();
    let id = {
        let mut repo = SqliteBannerRepository::try_new(&mut conn).unwrap();
        let ctx = OpContext::background();
        let id = repo
            .create_banner(&ctx, &BannerPayload::new(vec![1], 1, b"v1".to_vec(), true))
            .unwrap();
        repo.update_banner(&ctx, id, &BannerPayload::default().with_content("v2"))
            .unwrap();
        repo.delete_banner(&ctx, id).unwrap();
        id
    };

    let remaining: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM banner_version WHERE banner_id = ?1;",
            [id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(remaining, 0);
}
