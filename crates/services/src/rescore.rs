//! # Batch Rescorer
//!
//! Periodic maintenance pass over the active documents of one collection.
//! Documents past the inactivity threshold are frozen (marked inactive, score
//! left as is); all others get their score recomputed for the current time.
//! A failure on one document is recorded in the report and the pass moves on.
//!
//! Candidates arrive oldest first, so documents about to cross the threshold
//! are never starved by `max_documents`; whatever lies beyond the cap is
//! counted as skipped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::TimeDelta;
use domains::{
    Clock, CollectionKind, DocumentId, DocumentRepo, DomainError, DomainResult, VotableDocument,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::retry::{retry_on_conflict, RetryPolicy};
use crate::score::ScoreModel;

#[derive(Debug, Clone)]
pub struct RescoreConfig {
    /// Documents at least this old are marked inactive
    pub inactivity_threshold: TimeDelta,
    /// Upper bound on documents visited per pass
    pub max_documents: usize,
    /// Wall-clock budget per pass; remaining documents are skipped
    pub time_budget: Duration,
    /// Write the score even when it did not change
    pub force_update: bool,
    pub retry: RetryPolicy,
}

impl Default for RescoreConfig {
    fn default() -> Self {
        Self {
            inactivity_threshold: TimeDelta::days(60),
            max_documents: 10_000,
            time_budget: Duration::from_secs(30),
            force_update: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Summary of one batch pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub collection: CollectionKind,
    pub updated_count: usize,
    pub deactivated_count: usize,
    pub unchanged_count: usize,
    /// Documents not visited, either beyond `max_documents` or because the
    /// time budget ran out
    pub skipped_count: usize,
    pub errored_ids: Vec<DocumentId>,
    pub budget_exhausted: bool,
}

impl BatchReport {
    fn new(collection: CollectionKind) -> Self {
        Self {
            collection,
            updated_count: 0,
            deactivated_count: 0,
            unchanged_count: 0,
            skipped_count: 0,
            errored_ids: Vec::new(),
            budget_exhausted: false,
        }
    }

    /// True when every active document was processed without error.
    pub fn is_complete(&self) -> bool {
        self.errored_ids.is_empty() && self.skipped_count == 0 && !self.budget_exhausted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rescored {
    Updated,
    Deactivated,
    Unchanged,
}

pub struct RescoreService {
    documents: Arc<dyn DocumentRepo>,
    clock: Arc<dyn Clock>,
    model: ScoreModel,
    config: RescoreConfig,
}

impl RescoreService {
    pub fn new(
        documents: Arc<dyn DocumentRepo>,
        clock: Arc<dyn Clock>,
        model: ScoreModel,
        config: RescoreConfig,
    ) -> Self {
        Self {
            documents,
            clock,
            model,
            config,
        }
    }

    /// Runs one pass over the active documents of `collection`.
    ///
    /// Only a failure to list the candidates fails the whole call; per-document
    /// failures end up in [`BatchReport::errored_ids`].
    #[instrument(skip(self))]
    pub async fn batch_update_score(&self, collection: CollectionKind) -> DomainResult<BatchReport> {
        let started = Instant::now();
        let candidates = self
            .documents
            .list_active(collection, self.config.max_documents)
            .await?;
        let total = candidates.len();
        let mut report = BatchReport::new(collection);

        // A full page may be hiding more active documents behind the cap
        if total >= self.config.max_documents {
            let active = self.documents.count_active(collection).await?;
            report.skipped_count = active.saturating_sub(total);
            if report.skipped_count > 0 {
                warn!(
                    skipped = report.skipped_count,
                    max_documents = self.config.max_documents,
                    "more active documents than one pass may visit"
                );
            }
        }

        for (index, document) in candidates.into_iter().enumerate() {
            if started.elapsed() >= self.config.time_budget {
                report.budget_exhausted = true;
                report.skipped_count += total - index;
                warn!(
                    skipped = report.skipped_count,
                    budget_ms = self.config.time_budget.as_millis() as u64,
                    "rescore time budget exhausted"
                );
                break;
            }

            let id = document.id;
            let mut snapshot = Some(document);
            let result = retry_on_conflict(&self.config.retry, move || {
                let seed = snapshot.take();
                self.rescore_one(id, seed)
            })
            .await;

            match result {
                Ok(Rescored::Updated) => report.updated_count += 1,
                Ok(Rescored::Deactivated) => report.deactivated_count += 1,
                Ok(Rescored::Unchanged) => report.unchanged_count += 1,
                Err(err) => {
                    warn!(document_id = %id, error = %err, "failed to rescore document");
                    report.errored_ids.push(id);
                }
            }
        }

        info!(
            updated = report.updated_count,
            deactivated = report.deactivated_count,
            unchanged = report.unchanged_count,
            errored = report.errored_ids.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rescore pass finished"
        );
        Ok(report)
    }

    /// Rescores from `seed` on the first attempt and from a fresh read after that.
    async fn rescore_one(
        &self,
        id: DocumentId,
        seed: Option<VotableDocument>,
    ) -> DomainResult<Rescored> {
        let document = match seed {
            Some(document) => document,
            None => self
                .documents
                .find_document(id)
                .await?
                .ok_or_else(|| DomainError::not_found("document", id))?,
        };
        // Demoted by a concurrent pass since the snapshot was taken
        if document.inactive {
            return Ok(Rescored::Unchanged);
        }

        let now = self.clock.now();
        let posted_at = document.posted_at.ok_or_else(|| {
            DomainError::Validation(format!("document {id} has no posted_at"))
        })?;
        let expected_version = document.version;

        if now - posted_at > self.config.inactivity_threshold {
            let mut next = document;
            next.inactive = true;
            self.documents.compare_and_swap(expected_version, next).await?;
            return Ok(Rescored::Deactivated);
        }

        let score = self.model.recalculate(&document, now)?;
        if !self.config.force_update && score.to_bits() == document.score.to_bits() {
            return Ok(Rescored::Unchanged);
        }

        let mut next = document;
        next.score = score;
        self.documents.compare_and_swap(expected_version, next).await?;
        Ok(Rescored::Updated)
    }
}
