use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use domains::CollectionKind;
use integration_tests::{post, user, Harness};
use services::{
    recalculate_score, run_rescore_loop, RescoreConfig, RescoreService, ScoreModel,
};
use tokio::sync::watch;
use tokio_test::assert_ok;

#[tokio::test]
async fn inactive_posts_are_left_alone() {
    let h = Harness::new();
    let yesterday = h.days_ago(1);
    let published = h.publish_post(user(), yesterday).await;
    let frozen = h.force_inactive(published.id).await;

    h.clock.advance(TimeDelta::hours(1));
    let report = assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);

    assert_eq!(report.updated_count + report.unchanged_count, 0);
    let after = h.reload(published.id).await;
    assert!(after.inactive);
    assert!((after.score - frozen.score).abs() < 1e-3);
    assert_eq!(after.posted_at, Some(yesterday));
    assert_eq!(after.version, frozen.version);
}

#[tokio::test]
async fn posts_older_than_sixty_days_are_deactivated_with_their_score_frozen() {
    let h = Harness::new();
    let published = h.publish_post(user(), h.days_ago(60)).await;
    assert!(!published.inactive);

    h.clock.advance(TimeDelta::minutes(1));
    let report = assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);

    assert_eq!(report.deactivated_count, 1);
    let after = h.reload(published.id).await;
    assert!(after.inactive);
    assert_eq!(after.score.to_bits(), published.score.to_bits());
}

#[tokio::test]
async fn posts_exactly_sixty_days_old_stay_active() {
    let h = Harness::new();
    let published = h.publish_post(user(), h.days_ago(60)).await;

    let report = assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);

    assert_eq!(report.deactivated_count, 0);
    assert!(!h.reload(published.id).await.inactive);
}

#[tokio::test]
async fn frontpage_and_curated_posts_outrank_equal_votes() {
    let h = Harness::new();
    let posted_at = h.days_ago(1);

    let normal = h.insert(post(10, posted_at)).await;
    let mut frontpage = post(10, posted_at);
    frontpage.frontpage_date = Some(posted_at);
    let frontpage = h.insert(frontpage).await;
    let mut curated = post(10, posted_at);
    curated.frontpage_date = Some(posted_at);
    curated.curated_date = Some(posted_at);
    let curated = h.insert(curated).await;

    let report = assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);
    assert_eq!(report.updated_count, 3);

    let (normal_id, frontpage_id, curated_id) = (normal.id, frontpage.id, curated.id);
    let normal = h.reload(normal_id).await.score;
    let frontpage = h.reload(frontpage_id).await.score;
    let curated = h.reload(curated_id).await.score;
    assert!(normal > 0.0);
    assert!(frontpage > normal + 1.0, "{frontpage} vs {normal}");
    assert!(curated > frontpage + 1.0, "{curated} vs {frontpage}");

    // The editorial lead survives well past the first day
    h.clock.advance(TimeDelta::days(30));
    assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);
    let normal = h.reload(normal_id).await.score;
    let frontpage = h.reload(frontpage_id).await.score;
    let curated = h.reload(curated_id).await.score;
    assert!(frontpage > normal + 1.0, "{frontpage} vs {normal}");
    assert!(curated > frontpage + 1.0, "{curated} vs {frontpage}");
}

#[tokio::test]
async fn batch_scores_match_single_document_recalculation() {
    let h = Harness::new();
    let mut ids = Vec::new();
    for (base_score, hours) in [(10, 3), (-4, 30), (0, 200), (25, 1_000)] {
        let doc = h
            .insert(post(base_score, h.now() - TimeDelta::hours(hours)))
            .await;
        ids.push(doc.id);
    }

    assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);

    for id in ids {
        let doc = h.reload(id).await;
        let expected = assert_ok!(recalculate_score(&doc, h.now()));
        assert!(
            (doc.score - expected).abs() < 1e-3,
            "{id}: batch {} vs single {expected}",
            doc.score
        );
    }
}

#[tokio::test]
async fn scores_decay_between_passes_and_settle_without_time_passing() {
    let h = Harness::new();
    let doc = h.insert(post(10, h.days_ago(1))).await;

    assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);
    let first = h.reload(doc.id).await.score;

    h.clock.advance(TimeDelta::hours(6));
    let report = assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);
    assert_eq!(report.updated_count, 1);
    let second = h.reload(doc.id).await.score;
    assert!(second < first);

    let report = assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);
    assert_eq!(report.unchanged_count, 1);
    assert_eq!(report.updated_count, 0);
}

#[tokio::test]
async fn only_the_requested_collection_is_touched() {
    let h = Harness::new();
    let mut comment = post(5, h.days_ago(1));
    comment.collection = CollectionKind::Comments;
    let comment = h.insert(comment).await;
    h.insert(post(5, h.days_ago(1))).await;

    let report = assert_ok!(h.rescore.batch_update_score(CollectionKind::Posts).await);
    assert_eq!(report.updated_count, 1);
    assert_eq!(h.reload(comment.id).await.version, comment.version);

    let report = assert_ok!(h.rescore.batch_update_score(CollectionKind::Comments).await);
    assert_eq!(report.collection, CollectionKind::Comments);
    assert_eq!(report.updated_count, 1);
}

#[tokio::test]
async fn exhausted_time_budget_skips_the_rest() {
    let h = Harness::new();
    for _ in 0..3 {
        h.insert(post(1, h.days_ago(1))).await;
    }
    let rescorer = RescoreService::new(
        Arc::new(h.store.clone()),
        h.clock.clone(),
        ScoreModel::default(),
        RescoreConfig {
            time_budget: Duration::ZERO,
            ..RescoreConfig::default()
        },
    );

    let report = assert_ok!(rescorer.batch_update_score(CollectionKind::Posts).await);

    assert!(report.budget_exhausted);
    assert_eq!(report.skipped_count, 3);
    assert!(!report.is_complete());
}

#[tokio::test]
async fn documents_past_the_cap_are_reported_and_the_oldest_come_first() {
    let h = Harness::new();
    let oldest = h.insert(post(3, h.days_ago(61))).await;
    let middle = h.insert(post(3, h.days_ago(10))).await;
    let newest = h.insert(post(3, h.days_ago(1))).await;
    let rescorer = RescoreService::new(
        Arc::new(h.store.clone()),
        h.clock.clone(),
        ScoreModel::default(),
        RescoreConfig {
            max_documents: 2,
            ..RescoreConfig::default()
        },
    );

    let report = assert_ok!(rescorer.batch_update_score(CollectionKind::Posts).await);

    assert_eq!(report.deactivated_count, 1);
    assert_eq!(report.updated_count, 1);
    assert_eq!(report.skipped_count, 1);
    assert!(!report.budget_exhausted);
    assert!(!report.is_complete());
    assert!(h.reload(oldest.id).await.inactive);
    assert_ne!(h.reload(middle.id).await.version, middle.version);
    assert_eq!(h.reload(newest.id).await.version, newest.version);

    // The active set shrank, so the next pass reaches everything
    let report = assert_ok!(rescorer.batch_update_score(CollectionKind::Posts).await);
    assert_eq!(report.skipped_count, 0);
    assert!(report.is_complete());
    assert_ne!(h.reload(newest.id).await.version, newest.version);
}

#[tokio::test]
async fn scheduler_rescores_until_shut_down() {
    let h = Harness::new();
    let doc = h.insert(post(10, h.days_ago(2))).await;
    let rescorer = Arc::new(RescoreService::new(
        Arc::new(h.store.clone()),
        h.clock.clone(),
        ScoreModel::default(),
        RescoreConfig::default(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run_rescore_loop(
        rescorer,
        vec![CollectionKind::Posts, CollectionKind::Comments],
        Duration::from_millis(10),
        shutdown_rx,
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    let ticks = handle.await.unwrap();

    assert!(ticks >= 1);
    assert!(h.reload(doc.id).await.score > 0.0);
}
