//! Publishing and reading votable documents.

use std::sync::Arc;

use domains::{
    Clock, DocumentId, DocumentRepo, DomainError, DomainResult, NewDocument, VotableDocument,
    VoteType,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::voting::{VoteRequest, VoteService};

pub struct DocumentService {
    documents: Arc<dyn DocumentRepo>,
    voting: Arc<VoteService>,
    clock: Arc<dyn Clock>,
    /// Authors upvote their own documents on publish
    self_vote_on_publish: bool,
}

impl DocumentService {
    pub fn new(
        documents: Arc<dyn DocumentRepo>,
        voting: Arc<VoteService>,
        clock: Arc<dyn Clock>,
        self_vote_on_publish: bool,
    ) -> Self {
        Self {
            documents,
            voting,
            clock,
            self_vote_on_publish,
        }
    }

    /// Stores a new, active document with its initial score.
    ///
    /// Drafts (no `posted_at`) are stored unscored and receive no author vote.
    #[instrument(skip(self, new), fields(collection = %new.collection, author_id = %new.author_id))]
    pub async fn publish(&self, new: NewDocument) -> DomainResult<VotableDocument> {
        let mut document = VotableDocument {
            id: Uuid::now_v7(),
            collection: new.collection,
            author_id: new.author_id,
            base_score: 0,
            score: 0.0,
            vote_count: 0,
            posted_at: new.posted_at,
            inactive: false,
            frontpage_date: new.frontpage_date,
            curated_date: new.curated_date,
            version: 0,
        };

        if document.posted_at.is_some() {
            document.score = self.voting.model().recalculate(&document, self.clock.now())?;
        }
        self.documents.insert_document(document.clone()).await?;
        info!(document_id = %document.id, "document published");

        if self.self_vote_on_publish && document.posted_at.is_some() {
            self.voting
                .perform_vote(VoteRequest {
                    document_id: document.id,
                    vote_type: VoteType::SmallUpvote.to_string(),
                    user_id: document.author_id,
                })
                .await?;
            return self.get(document.id).await;
        }

        Ok(document)
    }

    pub async fn get(&self, id: DocumentId) -> DomainResult<VotableDocument> {
        self.documents
            .find_document(id)
            .await?
            .ok_or_else(|| DomainError::not_found("document", id))
    }
}
