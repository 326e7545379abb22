//! Shared fixtures for the end-to-end tests: every service wired to one
//! in-memory store and a manual clock.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use domains::{
    CollectionKind, DocumentId, DocumentRepo, ManualClock, NewDocument, UserId, VotableDocument,
};
use services::{
    DocumentService, RescoreConfig, RescoreService, RetryPolicy, ScoreModel, VoteOutcome,
    VoteRequest, VoteService,
};
use storage_adapters::MemoryStore;
use uuid::Uuid;

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub voting: Arc<VoteService>,
    pub documents: DocumentService,
    pub rescore: RescoreService,
}

impl Harness {
    /// Authors upvote their own posts, as on the live forum.
    pub fn new() -> Self {
        Self::build(true, RetryPolicy::immediate(5))
    }

    pub fn without_self_votes() -> Self {
        Self::build(false, RetryPolicy::immediate(5))
    }

    pub fn build(self_vote_on_publish: bool, retry: RetryPolicy) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let model = ScoreModel::default();

        let voting = Arc::new(VoteService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
            model,
            retry.clone(),
        ));
        let documents = DocumentService::new(
            Arc::new(store.clone()),
            voting.clone(),
            clock.clone(),
            self_vote_on_publish,
        );
        let rescore = RescoreService::new(
            Arc::new(store.clone()),
            clock.clone(),
            model,
            RescoreConfig {
                retry,
                ..RescoreConfig::default()
            },
        );

        Self {
            store,
            clock,
            voting,
            documents,
            rescore,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        use domains::Clock;
        self.clock.now()
    }

    pub fn days_ago(&self, days: i64) -> DateTime<Utc> {
        self.now() - TimeDelta::days(days)
    }

    /// Publishes a post through the normal path (initial score, author vote).
    pub async fn publish_post(&self, author_id: UserId, posted_at: DateTime<Utc>) -> VotableDocument {
        self.documents
            .publish(NewDocument {
                collection: CollectionKind::Posts,
                author_id,
                posted_at: Some(posted_at),
                frontpage_date: None,
                curated_date: None,
            })
            .await
            .expect("publish post")
    }

    /// Inserts a document as-is, bypassing scoring and author votes.
    pub async fn insert(&self, document: VotableDocument) -> VotableDocument {
        self.store
            .insert_document(document.clone())
            .await
            .expect("insert document");
        document
    }

    pub async fn reload(&self, id: DocumentId) -> VotableDocument {
        self.documents.get(id).await.expect("reload document")
    }

    /// Flips `inactive` directly in storage, like an admin script would.
    pub async fn force_inactive(&self, id: DocumentId) -> VotableDocument {
        let current = self.reload(id).await;
        let version = current.version;
        let mut next = current;
        next.inactive = true;
        self.store
            .compare_and_swap(version, next)
            .await
            .expect("mark inactive")
    }

    pub async fn vote(&self, document_id: DocumentId, vote_type: &str, user_id: UserId) -> VoteOutcome {
        self.voting
            .perform_vote(VoteRequest {
                document_id,
                vote_type: vote_type.into(),
                user_id,
            })
            .await
            .expect("perform vote")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn user() -> UserId {
    Uuid::now_v7()
}

/// A bare post with the given base score, unscored and active.
pub fn post(base_score: i64, posted_at: DateTime<Utc>) -> VotableDocument {
    VotableDocument {
        id: Uuid::now_v7(),
        collection: CollectionKind::Posts,
        author_id: Uuid::now_v7(),
        base_score,
        score: 0.0,
        vote_count: 0,
        posted_at: Some(posted_at),
        inactive: false,
        frontpage_date: None,
        curated_date: None,
        version: 0,
    }
}
