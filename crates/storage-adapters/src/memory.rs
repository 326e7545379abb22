//! # In-memory store
//!
//! DashMap-backed implementation of every port. A document and its votes live
//! in one map entry, so a vote commit is atomic under that entry's shard lock.
//! Used by tests and by single-process deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use domains::{
    CollectionKind, DocumentId, DocumentRepo, DomainError, DomainResult, KarmaRepo, UserId,
    VotableDocument, Vote, VoteChange, VoteRepo,
};
use tracing::debug;

#[derive(Debug)]
struct Record {
    document: VotableDocument,
    votes: HashMap<UserId, Vote>,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Arc<DashMap<DocumentId, Record>>,
    karma: Arc<DashMap<UserId, i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_karma(&self, user_id: UserId, karma: i64) {
        self.karma.insert(user_id, karma);
    }

    /// Validates the version, stores `next` with the version bumped and
    /// applies `change` while the entry is locked.
    fn swap(
        &self,
        expected_version: u64,
        mut next: VotableDocument,
        change: Option<VoteChange>,
    ) -> DomainResult<VotableDocument> {
        let mut record = self
            .records
            .get_mut(&next.id)
            .ok_or_else(|| DomainError::not_found("document", next.id))?;

        if record.document.version != expected_version {
            debug!(
                document_id = %next.id,
                expected_version,
                actual_version = record.document.version,
                "version mismatch"
            );
            return Err(DomainError::Conflict(next.id.to_string()));
        }

        next.version = expected_version + 1;
        match change {
            Some(VoteChange::Cast(vote)) => {
                record.votes.insert(vote.user_id, vote);
            }
            Some(VoteChange::Clear { user_id }) => {
                record.votes.remove(&user_id);
            }
            None => {}
        }
        record.document = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl DocumentRepo for MemoryStore {
    async fn find_document(&self, id: DocumentId) -> DomainResult<Option<VotableDocument>> {
        Ok(self.records.get(&id).map(|r| r.document.clone()))
    }

    async fn insert_document(&self, document: VotableDocument) -> DomainResult<()> {
        match self.records.entry(document.id) {
            Entry::Occupied(_) => Err(DomainError::Conflict(document.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Record {
                    document,
                    votes: HashMap::new(),
                });
                Ok(())
            }
        }
    }

    async fn list_active(
        &self,
        collection: CollectionKind,
        limit: usize,
    ) -> DomainResult<Vec<VotableDocument>> {
        let mut active: Vec<VotableDocument> = self
            .records
            .iter()
            .filter(|r| r.document.collection == collection && !r.document.inactive)
            .map(|r| r.document.clone())
            .collect();
        active.sort_by_key(|d| (d.posted_at.is_none(), d.posted_at, d.id));
        active.truncate(limit);
        Ok(active)
    }

    async fn count_active(&self, collection: CollectionKind) -> DomainResult<usize> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.document.collection == collection && !r.document.inactive)
            .count())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: VotableDocument,
    ) -> DomainResult<VotableDocument> {
        self.swap(expected_version, next, None)
    }
}

#[async_trait]
impl VoteRepo for MemoryStore {
    async fn find_vote(
        &self,
        document_id: DocumentId,
        user_id: UserId,
    ) -> DomainResult<Option<Vote>> {
        Ok(self
            .records
            .get(&document_id)
            .and_then(|r| r.votes.get(&user_id).cloned()))
    }

    async fn list_votes(&self, document_id: DocumentId) -> DomainResult<Vec<Vote>> {
        let record = self
            .records
            .get(&document_id)
            .ok_or_else(|| DomainError::not_found("document", document_id))?;
        let mut votes: Vec<Vote> = record.votes.values().cloned().collect();
        votes.sort_by_key(|v| v.voted_at);
        Ok(votes)
    }

    async fn commit_vote(
        &self,
        expected_version: u64,
        next: VotableDocument,
        change: VoteChange,
    ) -> DomainResult<VotableDocument> {
        self.swap(expected_version, next, Some(change))
    }
}

#[async_trait]
impl KarmaRepo for MemoryStore {
    async fn karma_of(&self, user_id: UserId) -> DomainResult<i64> {
        Ok(self.karma.get(&user_id).map(|k| *k).unwrap_or(0))
    }
}
