//! Crawl orchestration.
//!
//! Seeds become pending handles, pending handles and IDs become profiles,
//! and accepted profiles are expanded into edges (which queue more IDs) and
//! messages. Every step reads durable state first, so a restarted process
//! picks up exactly where the previous one stopped.

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::identity::{normalize_handle, Identity};
use crate::pagination::{collect_new_ids, collect_new_messages};
use crate::scheduler::PassScheduler;
use crate::storage::{CorpusStore, StoreWriter};
use crate::traits::{AcceptancePolicy, SocialApi};
use crate::types::{Relationship, ResolutionOutcome, ResolvedProfile};

/// Outcome of one `drain_pending_ids` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Pending IDs whose profile was already stored.
    pub already_known: usize,
    pub resolved: usize,
    /// Looked up, but absent from the response (suspended or deleted).
    pub missing: usize,
    pub failed_batches: usize,
}

pub struct Crawler<A, P> {
    api: A,
    policy: P,
    store: CorpusStore,
    writer: StoreWriter,
}

impl<A, P> Crawler<A, P>
where
    A: SocialApi,
    P: AcceptancePolicy,
{
    pub fn new(api: A, policy: P, store: CorpusStore, writer: StoreWriter) -> Self {
        Self {
            api,
            policy,
            store,
            writer,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn store(&self) -> &CorpusStore {
        &self.store
    }

    pub fn writer(&self) -> &StoreWriter {
        &self.writer
    }

    /// Queue handles for resolution. Already-queued handles are untouched.
    pub async fn seed<I, S>(&self, handles: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let handles: Vec<String> = handles
            .into_iter()
            .map(|h| normalize_handle(h.as_ref()))
            .filter(|h| !h.is_empty())
            .collect();
        let count = handles.len();

        self.writer.enqueue_handles(handles).await?;
        self.writer.flush().await?;

        tracing::info!(count, "Seeded handles");
        Ok(count)
    }

    /// Resolve every unprocessed pending handle that has no stored profile,
    /// then mark it processed. Known handles cost no API call.
    pub async fn resolve_seeds(&self) -> Result<usize> {
        let handles = self.store.unprocessed_handles().await?;
        let mut resolved = 0;

        for handle in handles {
            let identity = Identity::ByHandle(handle.clone());

            if self.store.profile_exists(&identity).await? {
                tracing::debug!(handle = %handle, "Seed already resolved");
            } else {
                match self.resolve_profile(&identity).await {
                    Ok(outcome) => {
                        resolved += 1;
                        tracing::info!(handle = %handle, ?outcome, "Resolved seed");
                    }
                    Err(e) if e.is_not_found() => {
                        tracing::warn!(handle = %handle, error = %e, "Seed does not exist, skipping");
                    }
                    Err(e) => return Err(e),
                }
            }

            self.writer.mark_handles_processed(vec![handle]).await?;
        }

        self.writer.flush().await?;
        Ok(resolved)
    }

    /// Fetch and store one profile, recording whether it is accepted.
    ///
    /// Protected profiles are stored processed but never accepted. Calling
    /// this for an already stored profile re-evaluates the policy.
    pub async fn resolve_profile(&self, identity: &Identity) -> Result<ResolutionOutcome> {
        let profile = self.api.resolve_profile(identity).await?;
        let outcome = self.judge(&profile);

        tracing::debug!(
            profile_id = profile.id,
            handle = %profile.handle,
            ?outcome,
            "Judged profile"
        );

        self.writer.record_profile(profile, outcome).await?;
        Ok(outcome)
    }

    fn judge(&self, profile: &ResolvedProfile) -> ResolutionOutcome {
        if profile.protected {
            ResolutionOutcome::Protected
        } else {
            ResolutionOutcome::Judged {
                accepted: self.policy.accept(&profile.raw),
            }
        }
    }

    /// Resolve every unprocessed pending ID.
    ///
    /// IDs with a stored profile are marked processed without a call. The
    /// rest are looked up in sequential batches of at most
    /// [`SocialApi::max_batch_size`]; an API failure leaves that batch
    /// pending for a later pass without stopping the others. A 404 means
    /// none of the batch exists, so it is marked processed as missing.
    pub async fn drain_pending_ids(&self) -> Result<DrainSummary> {
        let pending = self.store.pending_ids().await?;
        let (known, unknown): (Vec<_>, Vec<_>) = pending.into_iter().partition(|p| p.known);

        let mut summary = DrainSummary {
            already_known: known.len(),
            ..Default::default()
        };
        self.writer
            .mark_ids_processed(known.into_iter().map(|p| p.user_id).collect())
            .await?;

        let unknown: Vec<i64> = unknown.into_iter().map(|p| p.user_id).collect();
        let batch_size = self.api.max_batch_size().max(1);

        for batch in unknown.chunks(batch_size) {
            let profiles = match self.api.resolve_profiles(batch).await {
                Ok(profiles) => profiles,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(
                        batch_size = batch.len(),
                        first_id = batch[0],
                        "No profile in batch exists, marking processed"
                    );
                    Vec::new()
                }
                Err(e) if e.is_api_failure() => {
                    summary.failed_batches += 1;
                    tracing::warn!(
                        batch_size = batch.len(),
                        first_id = batch[0],
                        error = %e,
                        "Bulk lookup failed, leaving batch pending"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            summary.resolved += profiles.len();
            summary.missing += batch.len().saturating_sub(profiles.len());

            let judged = profiles
                .into_iter()
                .map(|p| {
                    let outcome = self.judge(&p);
                    (p, outcome)
                })
                .collect();
            self.writer.record_profiles(judged).await?;
            self.writer.mark_ids_processed(batch.to_vec()).await?;
        }

        self.writer.flush().await?;

        if summary != DrainSummary::default() {
            tracing::info!(
                already_known = summary.already_known,
                resolved = summary.resolved,
                missing = summary.missing,
                failed_batches = summary.failed_batches,
                "Drained pending ids"
            );
        }
        Ok(summary)
    }

    /// Record new `kind` edges for every accepted profile and queue the
    /// newly seen IDs. Returns the number of new edges.
    pub async fn expand_relationships(&self, kind: Relationship) -> Result<usize> {
        let frontier = self.store.accepted_profiles().await?;
        let mut total = 0;

        for profile in frontier {
            let identity = Identity::ByNumericId(profile.id);
            let watermark = profile.watermark(kind);

            let api = &self.api;
            let who = &identity;
            let new_ids =
                collect_new_ids(watermark, move |cursor| api.relationship_page(who, kind, cursor)).await?;

            let Some(&newest) = new_ids.first() else {
                tracing::debug!(profile_id = profile.id, %kind, "No new relationships");
                continue;
            };
            let new_edges = new_ids.len();
            total += new_edges;

            self.writer.store_edges(kind, profile.id, new_ids).await?;
            self.writer
                .advance_relationship_watermark(kind, profile.id, newest)
                .await?;

            tracing::info!(
                profile_id = profile.id,
                handle = %profile.handle,
                %kind,
                new_edges,
                "Expanded relationships"
            );
        }

        self.writer.flush().await?;
        Ok(total)
    }

    /// Store messages newer than each accepted profile's watermark. Returns
    /// the number of new messages.
    pub async fn expand_messages(&self) -> Result<usize> {
        let frontier = self.store.accepted_profiles().await?;
        let mut total = 0;

        for profile in frontier {
            let identity = Identity::ByNumericId(profile.id);

            let api = &self.api;
            let who = &identity;
            let messages =
                collect_new_messages(profile.message_watermark, move |max_id| api.message_page(who, max_id))
                    .await?;

            let Some(newest) = messages.iter().map(|m| m.id).max() else {
                tracing::debug!(profile_id = profile.id, "No new messages");
                continue;
            };
            let new_messages = messages.len();
            total += new_messages;

            self.writer.store_messages(profile.id, messages).await?;
            self.writer
                .advance_message_watermark(profile.id, newest, Utc::now())
                .await?;

            tracing::info!(
                profile_id = profile.id,
                handle = %profile.handle,
                new_messages,
                watermark = newest,
                "Expanded messages"
            );
        }

        self.writer.flush().await?;
        Ok(total)
    }
}

impl<A, P> Crawler<A, P>
where
    A: SocialApi + 'static,
    P: AcceptancePolicy + 'static,
{
    /// Resolve seeds once, then run the four expansion passes forever on
    /// `scheduler`. Returns only when a supervised task fails.
    pub async fn run(self: Arc<Self>, mut scheduler: PassScheduler) -> Result<()> {
        let resolved = self.resolve_seeds().await?;
        tracing::info!(resolved, "Seeds resolved, starting expansion passes");

        let crawler = self.clone();
        scheduler.repeat("drain_pending_ids", move || {
            let crawler = crawler.clone();
            async move { crawler.drain_pending_ids().await.map(|_| ()) }
        });

        for kind in Relationship::ALL {
            let crawler = self.clone();
            let name = match kind {
                Relationship::Following => "expand_following",
                Relationship::Followers => "expand_followers",
            };
            scheduler.repeat(name, move || {
                let crawler = crawler.clone();
                async move { crawler.expand_relationships(kind).await.map(|_| ()) }
            });
        }

        let crawler = self.clone();
        scheduler.repeat("expand_messages", move || {
            let crawler = crawler.clone();
            async move { crawler.expand_messages().await.map(|_| ()) }
        });

        scheduler.run().await
    }
}
