use chrono::TimeDelta;
use domains::{DomainError, VoteType};
use integration_tests::{post, user, Harness};
use services::VoteRequest;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn voting_reactivates_an_inactive_post() {
    let h = Harness::new();
    let author = user();
    let yesterday = h.days_ago(1);
    let published = h.publish_post(author, yesterday).await;

    let inactive = h.force_inactive(published.id).await;
    assert!(inactive.inactive);

    h.vote(published.id, "smallUpvote", user()).await;

    let updated = h.reload(published.id).await;
    assert!(!updated.inactive);
    assert_eq!(updated.posted_at, Some(yesterday));
}

#[tokio::test]
async fn upvote_raises_the_score() {
    let h = Harness::new();
    let published = h.publish_post(user(), h.days_ago(1)).await;
    let pre = published.score;

    let outcome = h.vote(published.id, "smallUpvote", user()).await;

    assert_eq!(outcome.base_score, 2);
    assert_eq!(outcome.user_vote, Some(VoteType::SmallUpvote));
    assert!(h.reload(published.id).await.score > pre);
}

#[tokio::test]
async fn downvote_lowers_the_score() {
    let h = Harness::new();
    let published = h.publish_post(user(), h.days_ago(1)).await;
    let pre = published.score;

    let outcome = h.vote(published.id, "smallDownvote", user()).await;

    assert_eq!(outcome.base_score, 0);
    assert!(h.reload(published.id).await.score < pre);
}

#[tokio::test]
async fn downvote_replaces_a_previous_upvote() {
    let h = Harness::new();
    let voter = user();
    let published = h.publish_post(user(), h.days_ago(1)).await;
    assert_eq!(published.base_score, 1);
    let pre = published.score;

    h.vote(published.id, "smallUpvote", voter).await;
    h.vote(published.id, "smallDownvote", voter).await;

    let updated = h.reload(published.id).await;
    assert_eq!(updated.base_score, 0);
    assert!(updated.score < pre);
    // author plus the switched voter
    assert_eq!(updated.vote_count, 2);
}

#[tokio::test]
async fn upvote_replaces_a_previous_downvote() {
    let h = Harness::new();
    let voter = user();
    let published = h.publish_post(user(), h.days_ago(1)).await;
    let pre = published.score;

    h.vote(published.id, "smallDownvote", voter).await;
    h.vote(published.id, "smallUpvote", voter).await;

    let updated = h.reload(published.id).await;
    assert_eq!(updated.base_score, 2);
    assert!(updated.score > pre);
}

#[tokio::test]
async fn switching_without_an_author_vote_nets_the_powers() {
    let h = Harness::without_self_votes();
    let voter = user();
    let published = h.publish_post(user(), h.days_ago(1)).await;
    assert_eq!(published.base_score, 0);

    assert_eq!(h.vote(published.id, "smallUpvote", voter).await.base_score, 1);
    assert_eq!(h.vote(published.id, "smallDownvote", voter).await.base_score, -1);

    let other = h.publish_post(user(), h.days_ago(1)).await;
    assert_eq!(h.vote(other.id, "smallDownvote", voter).await.base_score, -1);
    assert_eq!(h.vote(other.id, "smallUpvote", voter).await.base_score, 1);
}

#[tokio::test]
async fn repeating_a_vote_takes_it_back() {
    let h = Harness::without_self_votes();
    let voter = user();
    let published = h.publish_post(user(), h.days_ago(1)).await;

    h.vote(published.id, "smallUpvote", voter).await;
    let outcome = h.vote(published.id, "smallUpvote", voter).await;

    assert_eq!(outcome.base_score, 0);
    assert_eq!(outcome.vote_count, 0);
    assert_eq!(outcome.user_vote, None);
    assert!(assert_ok!(h.voting.vote_of(published.id, voter).await).is_none());
}

#[tokio::test]
async fn neutral_vote_clears_without_casting() {
    let h = Harness::without_self_votes();
    let voter = user();
    let published = h.publish_post(user(), h.days_ago(1)).await;

    h.vote(published.id, "bigDownvote", voter).await;
    let outcome = h.vote(published.id, "neutral", voter).await;

    assert_eq!(outcome.base_score, 0);
    assert_eq!(outcome.user_vote, None);
}

#[tokio::test]
async fn vote_power_follows_karma() {
    let h = Harness::without_self_votes();
    let (veteran, newcomer) = (user(), user());
    h.store.set_karma(veteran, 1_000);
    h.store.set_karma(newcomer, 5);
    let published = h.publish_post(user(), h.days_ago(1)).await;

    assert_eq!(h.vote(published.id, "smallUpvote", veteran).await.base_score, 2);
    assert_eq!(h.vote(published.id, "bigUpvote", newcomer).await.base_score, 3);
    // veteran switches to a strong upvote: 2 out, 6 in
    assert_eq!(h.vote(published.id, "bigUpvote", veteran).await.base_score, 7);

    let stored = assert_ok!(h.voting.vote_of(published.id, veteran).await).unwrap();
    assert_eq!(stored.vote_type, VoteType::BigUpvote);
    assert_eq!(stored.power, 6);
}

#[tokio::test]
async fn unknown_vote_type_changes_nothing() {
    let h = Harness::new();
    let published = h.publish_post(user(), h.days_ago(1)).await;

    let err = assert_err!(
        h.voting
            .perform_vote(VoteRequest {
                document_id: published.id,
                vote_type: "superUpvote".into(),
                user_id: user(),
            })
            .await
    );

    assert!(matches!(err, DomainError::Validation(_)));
    let unchanged = h.reload(published.id).await;
    assert_eq!(unchanged.version, published.version);
    assert_eq!(unchanged.base_score, published.base_score);
}

#[tokio::test]
async fn voting_on_a_missing_document_is_not_found() {
    let h = Harness::new();
    let ghost = post(0, h.days_ago(1));

    let err = assert_err!(
        h.voting
            .perform_vote(VoteRequest {
                document_id: ghost.id,
                vote_type: "smallUpvote".into(),
                user_id: user(),
            })
            .await
    );

    assert!(matches!(err, DomainError::NotFound(kind, _) if kind == "document"));
}

#[tokio::test]
async fn cancel_vote_removes_only_that_users_vote() {
    let h = Harness::new();
    let voter = user();
    let published = h.publish_post(user(), h.days_ago(1)).await;
    h.vote(published.id, "bigUpvote", voter).await;

    let outcome = assert_ok!(h.voting.cancel_vote(published.id, voter).await);
    assert_eq!(outcome.base_score, 1);
    assert_eq!(outcome.vote_count, 1);

    let err = assert_err!(h.voting.cancel_vote(published.id, voter).await);
    assert!(matches!(err, DomainError::NotFound(kind, _) if kind == "vote"));
}

#[tokio::test]
async fn vote_scores_against_the_current_time() {
    let h = Harness::without_self_votes();
    let voter = user();
    let published = h.publish_post(user(), h.days_ago(1)).await;

    h.vote(published.id, "smallUpvote", voter).await;
    let fresh = h.reload(published.id).await.score;

    h.clock.advance(TimeDelta::days(3));
    h.vote(published.id, "smallUpvote", voter).await;
    h.vote(published.id, "smallUpvote", voter).await;
    let later = h.reload(published.id).await;

    assert_eq!(later.base_score, 1);
    assert!(later.score < fresh);
    let expected = services::recalculate_score(&later, h.now()).unwrap();
    assert!((later.score - expected).abs() < 1e-9);
}

#[tokio::test]
async fn drafts_are_published_unscored_and_without_author_vote() {
    let h = Harness::new();
    let author = user();

    let draft = assert_ok!(
        h.documents
            .publish(domains::NewDocument {
                collection: domains::CollectionKind::Posts,
                author_id: author,
                posted_at: None,
                frontpage_date: None,
                curated_date: None,
            })
            .await
    );

    assert_eq!(draft.base_score, 0);
    assert_eq!(draft.score, 0.0);
    assert!(assert_ok!(h.voting.vote_of(draft.id, author).await).is_none());
}
