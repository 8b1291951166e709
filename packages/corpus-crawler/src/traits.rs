use async_trait::async_trait;

use crate::error::Result;
use crate::identity::Identity;
use crate::types::{FetchedMessage, Relationship, RelationshipPage, ResolvedProfile};

/// Largest bulk lookup the remote API accepts.
pub const DEFAULT_MAX_BATCH: usize = 100;

// ============================================================================
// API COLLABORATOR: Remote social graph (rate limiting is its concern)
// ============================================================================

#[async_trait]
pub trait SocialApi: Send + Sync {
    /// Fetch a single profile.
    async fn resolve_profile(&self, identity: &Identity) -> Result<ResolvedProfile>;

    /// Fetch up to [`SocialApi::max_batch_size`] profiles by numeric ID.
    /// Unknown IDs are absent from the result.
    async fn resolve_profiles(&self, ids: &[i64]) -> Result<Vec<ResolvedProfile>>;

    /// One page of relationship IDs. `cursor = -1` starts a traversal, a
    /// returned `next_cursor = 0` ends it, and passing `0` returns an empty page.
    async fn relationship_page(
        &self,
        identity: &Identity,
        kind: Relationship,
        cursor: i64,
    ) -> Result<RelationshipPage>;

    /// One page of messages, newest first, strictly older than `max_id`
    /// (`0` = most recent page).
    async fn message_page(&self, identity: &Identity, max_id: i64) -> Result<Vec<FetchedMessage>>;

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }
}

// ============================================================================
// ACCEPTANCE POLICY: Pure predicate over raw profile snapshots
// ============================================================================

pub trait AcceptancePolicy: Send + Sync {
    fn accept(&self, raw: &[u8]) -> bool;
}

impl<F> AcceptancePolicy for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn accept(&self, raw: &[u8]) -> bool {
        self(raw)
    }
}
