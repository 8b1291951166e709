//! [`SocialApi`] over the HTTP client.

use async_trait::async_trait;
use social_api::{SocialApiClient, SocialApiError, StatusSnapshot, UserRef, UserSnapshot};

use crate::error::{CrawlError, Result};
use crate::identity::Identity;
use crate::traits::SocialApi;
use crate::types::{FetchedMessage, Relationship, RelationshipPage, ResolvedProfile};

fn user_ref(identity: &Identity) -> UserRef<'_> {
    match identity {
        Identity::ByHandle(handle) => UserRef::ScreenName(handle),
        Identity::ByNumericId(id) => UserRef::UserId(*id),
    }
}

/// Classify a client failure, naming the call that produced it.
fn crawl_error(call: String, err: SocialApiError) -> CrawlError {
    match err {
        SocialApiError::Parse(message) => CrawlError::parse(call, message),
        SocialApiError::Api { status, message } => CrawlError::network(call, Some(status), message),
        other => CrawlError::network(call, None, other.to_string()),
    }
}

impl From<UserSnapshot> for ResolvedProfile {
    fn from(snapshot: UserSnapshot) -> Self {
        ResolvedProfile {
            id: snapshot.user.id,
            handle: snapshot.user.screen_name,
            description: snapshot.user.description,
            protected: snapshot.user.protected,
            raw: snapshot.raw,
        }
    }
}

impl From<StatusSnapshot> for FetchedMessage {
    fn from(snapshot: StatusSnapshot) -> Self {
        FetchedMessage {
            id: snapshot.status.id,
            created_at: snapshot.created_at,
            lang: snapshot.status.lang,
            text: snapshot.status.text,
            raw: snapshot.raw,
        }
    }
}

#[async_trait]
impl SocialApi for SocialApiClient {
    async fn resolve_profile(&self, identity: &Identity) -> Result<ResolvedProfile> {
        self.show_user(user_ref(identity))
            .await
            .map(ResolvedProfile::from)
            .map_err(|e| crawl_error(format!("resolve_profile({identity})"), e))
    }

    async fn resolve_profiles(&self, ids: &[i64]) -> Result<Vec<ResolvedProfile>> {
        let users = self.lookup_users(ids).await.map_err(|e| {
            let first = ids.first().copied().unwrap_or_default();
            crawl_error(
                format!("resolve_profiles({} ids starting at #{first})", ids.len()),
                e,
            )
        })?;
        Ok(users.into_iter().map(ResolvedProfile::from).collect())
    }

    async fn relationship_page(
        &self,
        identity: &Identity,
        kind: Relationship,
        cursor: i64,
    ) -> Result<RelationshipPage> {
        let user = user_ref(identity);
        let page = match kind {
            Relationship::Following => self.friend_ids(user, cursor).await,
            Relationship::Followers => self.follower_ids(user, cursor).await,
        }
        .map_err(|e| crawl_error(format!("relationship_page({identity}, {kind}, cursor={cursor})"), e))?;

        Ok(RelationshipPage {
            ids: page.ids,
            next_cursor: page.next_cursor,
        })
    }

    async fn message_page(&self, identity: &Identity, max_id: i64) -> Result<Vec<FetchedMessage>> {
        let statuses = self
            .user_timeline(user_ref(identity), max_id)
            .await
            .map_err(|e| crawl_error(format!("message_page({identity}, max_id={max_id})"), e))?;
        Ok(statuses.into_iter().map(FetchedMessage::from).collect())
    }

    fn max_batch_size(&self) -> usize {
        social_api::MAX_LOOKUP_BATCH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_is_kept_for_not_found_detection() {
        let err = crawl_error(
            "resolve_profile(@gone)".into(),
            SocialApiError::Api {
                status: 404,
                message: "User not found".into(),
            },
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("resolve_profile(@gone)"));
    }

    #[test]
    fn parse_failures_stay_parse_failures() {
        let err = crawl_error("message_page(#1, max_id=0)".into(), SocialApiError::Parse("bad".into()));
        assert!(matches!(err, CrawlError::Parse { .. }));
    }

    #[test]
    fn exhausted_rate_limit_is_a_network_failure() {
        let err = crawl_error(
            "relationship_page(#1, following, cursor=-1)".into(),
            SocialApiError::RateLimited {
                endpoint: "friends/ids.json",
            },
        );
        assert!(matches!(err, CrawlError::Network { status: None, .. }));
    }

    #[test]
    fn handles_map_to_screen_names() {
        let identity = Identity::handle("someone");
        assert_eq!(user_ref(&identity), UserRef::ScreenName("someone"));
        assert_eq!(user_ref(&Identity::id(7)), UserRef::UserId(7));
    }
}
