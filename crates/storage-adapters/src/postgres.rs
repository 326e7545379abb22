//! # PostgreSQL store
//!
//! Maps the ports onto the `votable_documents`, `votes` and `user_karma`
//! tables. Compare-and-swap is an `UPDATE … WHERE version = $n RETURNING …`,
//! so the caller gets back exactly the row it wrote; a vote commit runs that
//! update and the vote upsert/delete in one transaction.

use async_trait::async_trait;
use domains::{
    CollectionKind, DocumentId, DocumentRepo, DomainError, DomainResult, KarmaRepo, UserId,
    VotableDocument, Vote, VoteChange, VoteRepo,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{info, instrument};

const DOCUMENT_COLUMNS: &str = "id, collection, author_id, base_score, score, vote_count, \
     posted_at, inactive, frontpage_date, curated_date, version";

const UPDATE_IF_VERSION: &str = "UPDATE votable_documents \
     SET base_score = $3, score = $4, vote_count = $5, inactive = $6, \
         frontpage_date = $7, curated_date = $8, version = version + 1 \
     WHERE id = $1 AND version = $2 \
     RETURNING id, collection, author_id, base_score, score, vote_count, \
         posted_at, inactive, frontpage_date, curated_date, version";

const VOTE_COLUMNS: &str = "id, document_id, collection, user_id, vote_type, power, voted_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

fn db_err(err: sqlx::Error) -> DomainError {
    DomainError::Internal(format!("database error: {err}"))
}

fn row_to_document(row: &PgRow) -> DomainResult<VotableDocument> {
    let collection: String = row.try_get("collection").map_err(db_err)?;
    let version: i64 = row.try_get("version").map_err(db_err)?;

    Ok(VotableDocument {
        id: row.try_get("id").map_err(db_err)?,
        collection: collection.parse()?,
        author_id: row.try_get("author_id").map_err(db_err)?,
        base_score: row.try_get("base_score").map_err(db_err)?,
        score: row.try_get("score").map_err(db_err)?,
        vote_count: row.try_get("vote_count").map_err(db_err)?,
        posted_at: row.try_get("posted_at").map_err(db_err)?,
        inactive: row.try_get("inactive").map_err(db_err)?,
        frontpage_date: row.try_get("frontpage_date").map_err(db_err)?,
        curated_date: row.try_get("curated_date").map_err(db_err)?,
        version: u64::try_from(version)
            .map_err(|_| DomainError::Internal(format!("negative version {version}")))?,
    })
}

fn row_to_vote(row: &PgRow) -> DomainResult<Vote> {
    let collection: String = row.try_get("collection").map_err(db_err)?;
    let vote_type: String = row.try_get("vote_type").map_err(db_err)?;

    Ok(Vote {
        id: row.try_get("id").map_err(db_err)?,
        document_id: row.try_get("document_id").map_err(db_err)?,
        collection: collection.parse()?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        vote_type: vote_type.parse()?,
        power: row.try_get("power").map_err(db_err)?,
        voted_at: row.try_get("voted_at").map_err(db_err)?,
    })
}

/// Writes every mutable column of `next` if the stored version matches and
/// returns the row exactly as this statement left it. `None` if no row matched.
async fn update_if_version<'e>(
    executor: impl PgExecutor<'e>,
    expected_version: u64,
    next: &VotableDocument,
) -> DomainResult<Option<VotableDocument>> {
    let row = sqlx::query(UPDATE_IF_VERSION)
    .bind(next.id)
    .bind(expected_version as i64)
    .bind(next.base_score)
    .bind(next.score)
    .bind(next.vote_count)
    .bind(next.inactive)
    .bind(next.frontpage_date)
    .bind(next.curated_date)
    .fetch_optional(executor)
    .await
    .map_err(db_err)?;

    row.as_ref().map(row_to_document).transpose()
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> DomainResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> DomainResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Internal(format!("migration failed: {e}")))
    }

    /// Tells a lost race apart from a deleted document after a 0-row update.
    async fn missing_or_conflict(&self, id: DocumentId) -> DomainError {
        let exists = sqlx::query("SELECT 1 FROM votable_documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await;

        match exists {
            Ok(Some(_)) => DomainError::Conflict(id.to_string()),
            Ok(None) => DomainError::not_found("document", id),
            Err(err) => db_err(err),
        }
    }
}

#[async_trait]
impl DocumentRepo for PgStore {
    async fn find_document(&self, id: DocumentId) -> DomainResult<Option<VotableDocument>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM votable_documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_document).transpose()
    }

    #[instrument(skip(self, document), fields(document_id = %document.id))]
    async fn insert_document(&self, document: VotableDocument) -> DomainResult<()> {
        let result = sqlx::query(&format!(
            "INSERT INTO votable_documents ({DOCUMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (id) DO NOTHING"
        ))
        .bind(document.id)
        .bind(document.collection.as_str())
        .bind(document.author_id)
        .bind(document.base_score)
        .bind(document.score)
        .bind(document.vote_count)
        .bind(document.posted_at)
        .bind(document.inactive)
        .bind(document.frontpage_date)
        .bind(document.curated_date)
        .bind(document.version as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::Conflict(document.id.to_string()));
        }
        Ok(())
    }

    async fn list_active(
        &self,
        collection: CollectionKind,
        limit: usize,
    ) -> DomainResult<Vec<VotableDocument>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM votable_documents \
             WHERE collection = $1 AND NOT inactive \
             ORDER BY posted_at ASC NULLS LAST, id \
             LIMIT $2"
        ))
        .bind(collection.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_document).collect()
    }

    async fn count_active(&self, collection: CollectionKind) -> DomainResult<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM votable_documents WHERE collection = $1 AND NOT inactive",
        )
        .bind(collection.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        usize::try_from(count).map_err(|_| DomainError::Internal(format!("bad count {count}")))
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        next: VotableDocument,
    ) -> DomainResult<VotableDocument> {
        match update_if_version(&self.pool, expected_version, &next).await? {
            Some(saved) => Ok(saved),
            None => Err(self.missing_or_conflict(next.id).await),
        }
    }
}

#[async_trait]
impl VoteRepo for PgStore {
    async fn find_vote(
        &self,
        document_id: DocumentId,
        user_id: UserId,
    ) -> DomainResult<Option<Vote>> {
        let row = sqlx::query(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE document_id = $1 AND user_id = $2"
        ))
        .bind(document_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_vote).transpose()
    }

    async fn list_votes(&self, document_id: DocumentId) -> DomainResult<Vec<Vote>> {
        let rows = sqlx::query(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE document_id = $1 ORDER BY voted_at"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_vote).collect()
    }

    #[instrument(skip(self, next, change), fields(document_id = %next.id))]
    async fn commit_vote(
        &self,
        expected_version: u64,
        next: VotableDocument,
        change: VoteChange,
    ) -> DomainResult<VotableDocument> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let Some(saved) = update_if_version(&mut *tx, expected_version, &next).await? else {
            tx.rollback().await.map_err(db_err)?;
            return Err(self.missing_or_conflict(next.id).await);
        };

        match change {
            VoteChange::Cast(vote) => {
                sqlx::query(&format!(
                    "INSERT INTO votes ({VOTE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
                     ON CONFLICT (document_id, user_id) DO UPDATE SET \
                         id = EXCLUDED.id, vote_type = EXCLUDED.vote_type, \
                         power = EXCLUDED.power, voted_at = EXCLUDED.voted_at"
                ))
                .bind(vote.id)
                .bind(vote.document_id)
                .bind(vote.collection.as_str())
                .bind(vote.user_id)
                .bind(vote.vote_type.as_str())
                .bind(vote.power)
                .bind(vote.voted_at)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }
            VoteChange::Clear { user_id } => {
                sqlx::query("DELETE FROM votes WHERE document_id = $1 AND user_id = $2")
                    .bind(next.id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        Ok(saved)
    }
}

#[async_trait]
impl KarmaRepo for PgStore {
    async fn karma_of(&self, user_id: UserId) -> DomainResult<i64> {
        let karma: Option<i64> = sqlx::query_scalar("SELECT karma FROM user_karma WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(karma.unwrap_or(0))
    }
}
