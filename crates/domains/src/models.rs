//! # Domain Models
//!
//! These structs represent the entities the ranking engine reads and writes.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

pub type DocumentId = Uuid;
pub type UserId = Uuid;

/// Which collection a votable document lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Posts,
    Comments,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Comments => "comments",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(Self::Posts),
            "comments" => Ok(Self::Comments),
            other => Err(DomainError::Validation(format!(
                "unknown collection '{other}'"
            ))),
        }
    }
}

/// A post or comment that accumulates votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotableDocument {
    pub id: DocumentId,
    pub collection: CollectionKind,
    pub author_id: UserId,
    /// Net sum of the powers of all live votes
    pub base_score: i64,
    /// Decayed ranking value derived from `base_score`, age and editorial flags
    pub score: f64,
    /// Number of live votes
    pub vote_count: i64,
    /// `None` for drafts that were never posted; such documents cannot be scored
    pub posted_at: Option<DateTime<Utc>>,
    /// Set once the document ages out of periodic rescoring
    pub inactive: bool,
    pub frontpage_date: Option<DateTime<Utc>>,
    pub curated_date: Option<DateTime<Utc>>,
    /// Storage version, bumped by every committed write
    pub version: u64,
}

impl VotableDocument {
    /// Curated documents are always considered frontpage.
    pub fn is_frontpage(&self) -> bool {
        self.frontpage_date.is_some() || self.curated_date.is_some()
    }

    pub fn is_curated(&self) -> bool {
        self.curated_date.is_some()
    }
}

/// Input for publishing a new document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub collection: CollectionKind,
    pub author_id: UserId,
    pub posted_at: Option<DateTime<Utc>>,
    pub frontpage_date: Option<DateTime<Utc>>,
    pub curated_date: Option<DateTime<Utc>>,
}

/// The kinds of vote a user can cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoteType {
    /// Carries no weight; casting it clears any existing vote.
    Neutral,
    SmallUpvote,
    SmallDownvote,
    BigUpvote,
    BigDownvote,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::SmallUpvote => "smallUpvote",
            Self::SmallDownvote => "smallDownvote",
            Self::BigUpvote => "bigUpvote",
            Self::BigDownvote => "bigDownvote",
        }
    }

    /// Signed weight of this vote for a voter with the given karma.
    pub fn power(&self, karma: i64) -> i64 {
        match self {
            Self::Neutral => 0,
            Self::SmallUpvote => small_vote_power(karma),
            Self::SmallDownvote => -small_vote_power(karma),
            Self::BigUpvote => big_vote_power(karma),
            Self::BigDownvote => -big_vote_power(karma),
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "neutral" | "none" => Ok(Self::Neutral),
            "smallUpvote" => Ok(Self::SmallUpvote),
            "smallDownvote" => Ok(Self::SmallDownvote),
            "bigUpvote" => Ok(Self::BigUpvote),
            "bigDownvote" => Ok(Self::BigDownvote),
            other => Err(DomainError::Validation(format!(
                "unknown vote type '{other}'"
            ))),
        }
    }
}

fn small_vote_power(karma: i64) -> i64 {
    if karma >= 1_000 {
        2
    } else {
        1
    }
}

/// (minimum karma, power), highest tier first
const BIG_VOTE_TIERS: [(i64, i64); 15] = [
    (500_000, 16),
    (250_000, 15),
    (175_000, 14),
    (100_000, 13),
    (75_000, 12),
    (50_000, 11),
    (25_000, 10),
    (10_000, 9),
    (5_000, 8),
    (2_500, 7),
    (1_000, 6),
    (500, 5),
    (250, 4),
    (100, 3),
    (10, 2),
];

fn big_vote_power(karma: i64) -> i64 {
    BIG_VOTE_TIERS
        .iter()
        .find(|(min_karma, _)| karma >= *min_karma)
        .map(|(_, power)| *power)
        .unwrap_or(1)
}

/// One user's live vote on one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub id: Uuid,
    pub document_id: DocumentId,
    pub collection: CollectionKind,
    pub user_id: UserId,
    pub vote_type: VoteType,
    /// Weight frozen at cast time; removing the vote subtracts exactly this.
    pub power: i64,
    pub voted_at: DateTime<Utc>,
}

/// The vote-table half of an atomic vote commit.
#[derive(Debug, Clone, PartialEq)]
pub enum VoteChange {
    /// Store this vote, replacing any previous vote by the same user.
    Cast(Vote),
    /// Remove the user's vote, if any.
    Clear { user_id: UserId },
}
