//! # Incremental Vote Applier
//!
//! Applies one user's vote-state change to one document. The document update
//! and the vote record change are committed together through
//! [`VoteRepo::commit_vote`], guarded by the document version; a lost race is
//! re-read and retried under the configured [`RetryPolicy`].

use std::sync::Arc;

use domains::{
    Clock, DocumentId, DocumentRepo, DomainError, DomainResult, KarmaRepo, UserId,
    VotableDocument, Vote, VoteChange, VoteRepo, VoteType,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::retry::{retry_on_conflict, RetryPolicy};
use crate::score::ScoreModel;

/// A vote as received from the API layer, after authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub document_id: DocumentId,
    /// Wire name of the vote type, e.g. `"smallUpvote"`
    pub vote_type: String,
    pub user_id: UserId,
}

/// Document state after a vote was applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOutcome {
    pub document_id: DocumentId,
    pub base_score: i64,
    pub score: f64,
    pub inactive: bool,
    pub vote_count: i64,
    /// The voter's live vote after this call, `None` if it was toggled off
    pub user_vote: Option<VoteType>,
}

impl VoteOutcome {
    fn new(document: &VotableDocument, user_vote: Option<VoteType>) -> Self {
        Self {
            document_id: document.id,
            base_score: document.base_score,
            score: document.score,
            inactive: document.inactive,
            vote_count: document.vote_count,
            user_vote,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Intent {
    Cast(VoteType),
    Cancel,
}

pub struct VoteService {
    documents: Arc<dyn DocumentRepo>,
    votes: Arc<dyn VoteRepo>,
    karma: Arc<dyn KarmaRepo>,
    clock: Arc<dyn Clock>,
    model: ScoreModel,
    retry: RetryPolicy,
}

impl VoteService {
    pub fn new(
        documents: Arc<dyn DocumentRepo>,
        votes: Arc<dyn VoteRepo>,
        karma: Arc<dyn KarmaRepo>,
        clock: Arc<dyn Clock>,
        model: ScoreModel,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            documents,
            votes,
            karma,
            clock,
            model,
            retry,
        }
    }

    /// Casts, switches or toggles off a vote.
    ///
    /// Casting the vote type the user already holds, or `neutral`, removes
    /// their vote. Any other type replaces the previous vote: its power is
    /// subtracted before the new power is added. The document is marked active
    /// again regardless of its age.
    #[instrument(
        skip(self, request),
        fields(
            document_id = %request.document_id,
            user_id = %request.user_id,
            vote_type = %request.vote_type,
        )
    )]
    pub async fn perform_vote(&self, request: VoteRequest) -> DomainResult<VoteOutcome> {
        let vote_type: VoteType = request.vote_type.parse()?;
        let karma = self.karma.karma_of(request.user_id).await?;
        let (document_id, user_id) = (request.document_id, request.user_id);

        let outcome = retry_on_conflict(&self.retry, move || {
            self.apply(document_id, user_id, Intent::Cast(vote_type), karma)
        })
        .await?;

        info!(
            base_score = outcome.base_score,
            score = outcome.score,
            "vote applied"
        );
        Ok(outcome)
    }

    /// Removes the user's vote. `NotFound` if they have none on this document.
    #[instrument(skip(self))]
    pub async fn cancel_vote(
        &self,
        document_id: DocumentId,
        user_id: UserId,
    ) -> DomainResult<VoteOutcome> {
        let outcome = retry_on_conflict(&self.retry, move || {
            self.apply(document_id, user_id, Intent::Cancel, 0)
        })
        .await?;

        info!(base_score = outcome.base_score, "vote cancelled");
        Ok(outcome)
    }

    pub async fn vote_of(
        &self,
        document_id: DocumentId,
        user_id: UserId,
    ) -> DomainResult<Option<Vote>> {
        self.votes.find_vote(document_id, user_id).await
    }

    pub fn model(&self) -> &ScoreModel {
        &self.model
    }

    /// One read-modify-write attempt; a `Conflict` means the caller should re-read.
    async fn apply(
        &self,
        document_id: DocumentId,
        user_id: UserId,
        intent: Intent,
        karma: i64,
    ) -> DomainResult<VoteOutcome> {
        let document = self
            .documents
            .find_document(document_id)
            .await?
            .ok_or_else(|| DomainError::not_found("document", document_id))?;
        let existing = self.votes.find_vote(document_id, user_id).await?;

        let cast = match intent {
            Intent::Cancel if existing.is_none() => {
                return Err(DomainError::not_found(
                    "vote",
                    format!("{document_id}/{user_id}"),
                ));
            }
            Intent::Cancel | Intent::Cast(VoteType::Neutral) => None,
            Intent::Cast(vote_type)
                if existing.as_ref().is_some_and(|v| v.vote_type == vote_type) =>
            {
                None
            }
            Intent::Cast(vote_type) => Some(vote_type),
        };

        let now = self.clock.now();
        let old_power = existing.as_ref().map_or(0, |v| v.power);
        let (change, new_power) = match cast {
            Some(vote_type) => {
                let power = vote_type.power(karma);
                let vote = Vote {
                    id: Uuid::now_v7(),
                    document_id,
                    collection: document.collection,
                    user_id,
                    vote_type,
                    power,
                    voted_at: now,
                };
                (VoteChange::Cast(vote), power)
            }
            None => (VoteChange::Clear { user_id }, 0),
        };

        let expected_version = document.version;
        let mut next = document;
        next.base_score += new_power - old_power;
        next.vote_count += i64::from(cast.is_some()) - i64::from(existing.is_some());
        next.score = self.model.recalculate(&next, now)?;
        next.inactive = false;

        debug!(
            old_power,
            new_power,
            expected_version,
            "committing vote"
        );
        let saved = self.votes.commit_vote(expected_version, next, change).await?;
        Ok(VoteOutcome::new(&saved, cast))
    }
}
