//! Testing utilities including a scripted API collaborator.
//!
//! [`MockSocialApi`] serves profiles, relationship listings and timelines from
//! memory, paginates them the way the remote API does, and records every call
//! so tests can assert on how much network traffic a pass would cost.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::error::{CrawlError, Result};
use crate::identity::Identity;
use crate::pagination::{END_CURSOR, START_CURSOR};
use crate::traits::{SocialApi, DEFAULT_MAX_BATCH};
use crate::types::{FetchedMessage, Relationship, RelationshipPage, ResolvedProfile};

/// Record of a call made to the mock API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ResolveProfile { identity: Identity },
    ResolveProfiles { ids: Vec<i64> },
    RelationshipPage { user_id: i64, kind: Relationship, cursor: i64 },
    MessagePage { user_id: i64, max_id: i64 },
}

/// A profile snapshot with the fields the built-in policies read.
pub fn profile(id: i64, handle: &str, description: &str) -> ResolvedProfile {
    let raw = serde_json::json!({
        "id": id,
        "screen_name": handle,
        "description": description,
        "protected": false,
    });
    ResolvedProfile {
        id,
        handle: handle.to_string(),
        description: Some(description.to_string()),
        protected: false,
        raw: raw.to_string().into_bytes(),
    }
}

pub fn protected_profile(id: i64, handle: &str, description: &str) -> ResolvedProfile {
    let mut p = profile(id, handle, description);
    p.protected = true;
    p
}

pub fn message(id: i64) -> FetchedMessage {
    FetchedMessage {
        id,
        created_at: Utc.timestamp_opt(1_600_000_000 + id, 0).single().unwrap_or_default(),
        lang: Some("en".to_string()),
        text: format!("message {id}"),
        raw: format!(r#"{{"id":{id}}}"#).into_bytes(),
    }
}

#[derive(Default)]
pub struct MockSocialApi {
    profiles: Arc<RwLock<HashMap<i64, ResolvedProfile>>>,

    /// Lower-cased handle to profile ID
    handles: Arc<RwLock<HashMap<String, i64>>>,

    /// Full listings in traversal order (newest first)
    relationships: Arc<RwLock<HashMap<(i64, Relationship), Vec<i64>>>>,

    /// Timelines kept sorted newest first
    messages: Arc<RwLock<HashMap<i64, Vec<FetchedMessage>>>>,

    /// IDs whose bulk lookup fails with a server error
    failing_ids: Arc<RwLock<HashSet<i64>>>,

    relationship_page_size: usize,
    message_page_size: usize,

    /// Answer 404 when a bulk lookup matches no profile at all
    empty_lookup_not_found: bool,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockCall>>>,
}

impl MockSocialApi {
    pub fn new() -> Self {
        Self {
            relationship_page_size: 5000,
            message_page_size: 200,
            ..Default::default()
        }
    }

    pub fn with_profile(self, profile: ResolvedProfile) -> Self {
        self.add_profile(profile);
        self
    }

    pub fn with_relationships(self, user_id: i64, kind: Relationship, ids: Vec<i64>) -> Self {
        self.set_relationships(user_id, kind, ids);
        self
    }

    pub fn with_messages(self, user_id: i64, ids: impl IntoIterator<Item = i64>) -> Self {
        self.add_messages(user_id, ids);
        self
    }

    pub fn with_relationship_page_size(mut self, size: usize) -> Self {
        self.relationship_page_size = size.max(1);
        self
    }

    pub fn with_message_page_size(mut self, size: usize) -> Self {
        self.message_page_size = size.max(1);
        self
    }

    /// Answer a bulk lookup that finds nothing with 404, as users/lookup does.
    pub fn with_empty_lookup_not_found(mut self) -> Self {
        self.empty_lookup_not_found = true;
        self
    }

    /// Make every bulk lookup that includes `id` fail.
    pub fn failing_lookup_for(self, id: i64) -> Self {
        self.failing_ids.write().unwrap().insert(id);
        self
    }

    pub fn add_profile(&self, profile: ResolvedProfile) {
        self.handles
            .write()
            .unwrap()
            .insert(profile.handle.to_lowercase(), profile.id);
        self.profiles.write().unwrap().insert(profile.id, profile);
    }

    /// Replace a listing. `ids` are in traversal order, newest first.
    pub fn set_relationships(&self, user_id: i64, kind: Relationship, ids: Vec<i64>) {
        self.relationships.write().unwrap().insert((user_id, kind), ids);
    }

    /// Add messages to a timeline.
    pub fn add_messages(&self, user_id: i64, ids: impl IntoIterator<Item = i64>) {
        let mut messages = self.messages.write().unwrap();
        let timeline = messages.entry(user_id).or_default();
        timeline.extend(ids.into_iter().map(message));
        timeline.sort_by(|a, b| b.id.cmp(&a.id));
        timeline.dedup_by_key(|m| m.id);
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    /// Sizes of every bulk lookup made so far, in order.
    pub fn lookup_batches(&self) -> Vec<usize> {
        self.calls
            .read()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                MockCall::ResolveProfiles { ids } => Some(ids.len()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall) {
        self.calls.write().unwrap().push(call);
    }

    fn user_id(&self, identity: &Identity) -> Option<i64> {
        match identity {
            Identity::ByNumericId(id) => Some(*id),
            Identity::ByHandle(handle) => self.handles.read().unwrap().get(&handle.to_lowercase()).copied(),
        }
    }

    fn not_found(call: String) -> CrawlError {
        CrawlError::network(call, Some(404), "not found")
    }
}

#[async_trait]
impl SocialApi for MockSocialApi {
    async fn resolve_profile(&self, identity: &Identity) -> Result<ResolvedProfile> {
        self.record(MockCall::ResolveProfile {
            identity: identity.clone(),
        });

        self.user_id(identity)
            .and_then(|id| self.profiles.read().unwrap().get(&id).cloned())
            .ok_or_else(|| Self::not_found(format!("resolve_profile({identity})")))
    }

    async fn resolve_profiles(&self, ids: &[i64]) -> Result<Vec<ResolvedProfile>> {
        self.record(MockCall::ResolveProfiles { ids: ids.to_vec() });

        if ids.len() > self.max_batch_size() {
            return Err(CrawlError::network(
                "resolve_profiles",
                Some(400),
                format!("batch of {} exceeds {}", ids.len(), self.max_batch_size()),
            ));
        }
        let failing = self.failing_ids.read().unwrap();
        if ids.iter().any(|id| failing.contains(id)) {
            return Err(CrawlError::network("resolve_profiles", Some(503), "lookup unavailable"));
        }

        let profiles = self.profiles.read().unwrap();
        let found: Vec<ResolvedProfile> =
            ids.iter().filter_map(|id| profiles.get(id).cloned()).collect();
        if found.is_empty() && self.empty_lookup_not_found {
            return Err(Self::not_found("resolve_profiles".to_string()));
        }
        Ok(found)
    }

    async fn relationship_page(
        &self,
        identity: &Identity,
        kind: Relationship,
        cursor: i64,
    ) -> Result<RelationshipPage> {
        let call = format!("relationship_page({identity}, {kind}, cursor={cursor})");
        let user_id = self.user_id(identity).ok_or_else(|| Self::not_found(call.clone()))?;
        self.record(MockCall::RelationshipPage {
            user_id,
            kind,
            cursor,
        });

        if cursor == END_CURSOR {
            return Ok(RelationshipPage::default());
        }

        // Cursors encode the offset of the page start, shifted past the sentinels.
        let offset = if cursor == START_CURSOR { 0 } else { (cursor - 1) as usize };
        let listings = self.relationships.read().unwrap();
        let all = listings.get(&(user_id, kind)).map(Vec::as_slice).unwrap_or_default();

        let end = (offset + self.relationship_page_size).min(all.len());
        let ids = all.get(offset..end).map(<[i64]>::to_vec).unwrap_or_default();
        let next_cursor = if end < all.len() { end as i64 + 1 } else { END_CURSOR };

        Ok(RelationshipPage { ids, next_cursor })
    }

    async fn message_page(&self, identity: &Identity, max_id: i64) -> Result<Vec<FetchedMessage>> {
        let call = format!("message_page({identity}, max_id={max_id})");
        let user_id = self.user_id(identity).ok_or_else(|| Self::not_found(call))?;
        self.record(MockCall::MessagePage { user_id, max_id });

        let timelines = self.messages.read().unwrap();
        Ok(timelines
            .get(&user_id)
            .map(|timeline| {
                timeline
                    .iter()
                    .filter(|m| max_id == 0 || m.id < max_id)
                    .take(self.message_page_size)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relationship_listing_is_paginated() {
        let api = MockSocialApi::new()
            .with_profile(profile(1, "one", ""))
            .with_relationships(1, Relationship::Following, vec![9, 8, 7, 6, 5])
            .with_relationship_page_size(2);
        let who = Identity::id(1);

        let first = api.relationship_page(&who, Relationship::Following, START_CURSOR).await.unwrap();
        assert_eq!(first.ids, vec![9, 8]);
        let second = api.relationship_page(&who, Relationship::Following, first.next_cursor).await.unwrap();
        assert_eq!(second.ids, vec![7, 6]);
        let third = api.relationship_page(&who, Relationship::Following, second.next_cursor).await.unwrap();
        assert_eq!(third.ids, vec![5]);
        assert_eq!(third.next_cursor, END_CURSOR);
    }

    #[tokio::test]
    async fn timeline_pages_are_strictly_older_than_anchor() {
        let api = MockSocialApi::new()
            .with_profile(profile(1, "one", ""))
            .with_messages(1, [10, 30, 20])
            .with_message_page_size(2);
        let who = Identity::handle("ONE");

        let first: Vec<i64> = api.message_page(&who, 0).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(first, vec![30, 20]);
        let second: Vec<i64> = api.message_page(&who, 20).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(second, vec![10]);
    }

    #[tokio::test]
    async fn unknown_handle_is_not_found() {
        let api = MockSocialApi::new();
        let err = api.resolve_profile(&Identity::handle("nobody")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(api.calls().len(), 1);
    }
}
