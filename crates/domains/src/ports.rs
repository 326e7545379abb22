//! # Ports
//!
//! Any storage adapter must implement these traits to be wired into the services.
//! Every write goes through a compare-and-swap on `VotableDocument::version`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DomainResult;
use crate::models::{CollectionKind, DocumentId, UserId, VotableDocument, Vote, VoteChange};

/// Persistence contract for votable documents.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentRepo: Send + Sync {
    async fn find_document(&self, id: DocumentId) -> DomainResult<Option<VotableDocument>>;

    /// Fails with `Conflict` if a document with the same id already exists.
    async fn insert_document(&self, document: VotableDocument) -> DomainResult<()>;

    /// Snapshot of at most `limit` documents of `collection` with `inactive == false`,
    /// oldest `posted_at` first (unposted drafts last).
    async fn list_active(
        &self,
        collection: CollectionKind,
        limit: usize,
    ) -> DomainResult<Vec<VotableDocument>>;

    /// Number of documents of `collection` with `inactive == false`.
    async fn count_active(&self, collection: CollectionKind) -> DomainResult<usize>;

    /// Replaces the stored document if its version still equals `expected_version`.
    ///
    /// Returns the stored document with its version bumped. `NotFound` if the
    /// document vanished, `Conflict` if another writer got there first.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: VotableDocument,
    ) -> DomainResult<VotableDocument>;
}

/// Persistence contract for votes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VoteRepo: Send + Sync {
    async fn find_vote(
        &self,
        document_id: DocumentId,
        user_id: UserId,
    ) -> DomainResult<Option<Vote>>;

    async fn list_votes(&self, document_id: DocumentId) -> DomainResult<Vec<Vote>>;

    /// Commits the document update and the vote change as one atomic unit.
    ///
    /// Same version semantics as [`DocumentRepo::compare_and_swap`]; on failure
    /// neither half is written.
    async fn commit_vote(
        &self,
        expected_version: u64,
        next: VotableDocument,
        change: VoteChange,
    ) -> DomainResult<VotableDocument>;
}

/// Karma lookup used to weight votes.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait KarmaRepo: Send + Sync {
    /// Unknown users have zero karma.
    async fn karma_of(&self, user_id: UserId) -> DomainResult<i64>;
}

/// Source of "now" for age computations.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
