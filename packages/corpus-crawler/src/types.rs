use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two kinds of relationship edge the crawler collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    /// Accounts the subject follows.
    Following,
    /// Accounts that follow the subject.
    Followers,
}

impl Relationship {
    pub const ALL: [Relationship; 2] = [Relationship::Following, Relationship::Followers];

    /// Edge table holding this relationship.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Relationship::Following => "following",
            Relationship::Followers => "followers",
        }
    }

    /// Profile column holding this relationship's watermark.
    pub(crate) fn watermark_column(&self) -> &'static str {
        match self {
            Relationship::Following => "following_watermark",
            Relationship::Followers => "follower_watermark",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.table()
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored profile and its crawl bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: i64,
    pub handle: String,
    pub description: String,
    pub raw: Vec<u8>,
    pub protected: bool,
    pub message_watermark: i64,
    pub following_watermark: i64,
    pub follower_watermark: i64,
    pub last_looked_at: Option<DateTime<Utc>>,
    pub processed: bool,
    /// Only meaningful once `processed` is set.
    pub accepted: bool,
}

impl Profile {
    pub fn watermark(&self, kind: Relationship) -> i64 {
        match kind {
            Relationship::Following => self.following_watermark,
            Relationship::Followers => self.follower_watermark,
        }
    }
}

/// A profile as returned by the API collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub id: i64,
    pub handle: String,
    pub description: Option<String>,
    pub protected: bool,
    /// Exact serialized snapshot, kept for policy evaluation.
    pub raw: Vec<u8>,
}

/// A message as returned by the API collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub lang: Option<String>,
    pub text: String,
    pub raw: Vec<u8>,
}

/// One page of a cursored relationship listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipPage {
    pub ids: Vec<i64>,
    pub next_cursor: i64,
}

/// What resolving a profile decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Stored, but never expanded.
    Protected,
    Judged { accepted: bool },
}

impl ResolutionOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, ResolutionOutcome::Judged { accepted: true })
    }
}

/// Row counts and queue depths of a corpus.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CorpusCounts {
    pub profiles: i64,
    pub accepted: i64,
    pub protected: i64,
    pub messages: i64,
    pub following: i64,
    pub followers: i64,
    pub pending_handles: i64,
    pub pending_ids: i64,
}
