//! Watermark-bounded pagination.
//!
//! Both feeds are read newest to oldest. Given the newest item already known
//! (the watermark), collect exactly the items ahead of it with as few page
//! fetches as possible. A watermark of `0` means nothing is known yet.

use std::future::Future;

use crate::error::Result;
use crate::types::{FetchedMessage, RelationshipPage};

/// Cursor that starts a relationship traversal.
pub const START_CURSOR: i64 = -1;

/// Cursor signalling that a relationship traversal is complete.
pub const END_CURSOR: i64 = 0;

/// Split a relationship page at the watermark.
///
/// Returns the IDs before the watermark and whether it was found. The
/// watermark itself and everything after it are already known.
pub fn trim_till_id(page: &[i64], watermark: i64) -> (&[i64], bool) {
    if watermark == 0 {
        return (page, false);
    }
    match page.iter().position(|&id| id == watermark) {
        Some(idx) => (&page[..idx], true),
        None => (page, false),
    }
}

/// Drop every message not strictly newer than the watermark.
pub fn keep_newer(page: Vec<FetchedMessage>, watermark: i64) -> Vec<FetchedMessage> {
    page.into_iter().filter(|m| m.id > watermark).collect()
}

/// Walk a cursored relationship feed until the watermark, an empty page, or
/// the end cursor, returning the new IDs in traversal order.
pub async fn collect_new_ids<F, Fut>(watermark: i64, mut fetch: F) -> Result<Vec<i64>>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<RelationshipPage>>,
{
    let mut cursor = START_CURSOR;
    let mut new_ids = Vec::new();

    loop {
        let page = fetch(cursor).await?;
        if page.ids.is_empty() {
            break;
        }

        let (kept, found) = trim_till_id(&page.ids, watermark);
        new_ids.extend_from_slice(kept);

        if found || page.next_cursor == END_CURSOR {
            break;
        }
        cursor = page.next_cursor;
    }

    Ok(new_ids)
}

/// Walk a max-ID anchored message feed, returning messages newer than the
/// watermark, newest first.
pub async fn collect_new_messages<F, Fut>(watermark: i64, mut fetch: F) -> Result<Vec<FetchedMessage>>
where
    F: FnMut(i64) -> Fut,
    Fut: Future<Output = Result<Vec<FetchedMessage>>>,
{
    let mut max_id = 0;
    let mut new_messages = Vec::new();

    loop {
        let page = fetch(max_id).await?;
        let Some(oldest) = page.iter().map(|m| m.id).min() else {
            break;
        };

        // A page that does not reach below the anchor would repeat forever.
        if max_id != 0 && oldest >= max_id {
            tracing::warn!(max_id, oldest, "Message feed did not advance, stopping");
            break;
        }
        max_id = oldest;

        new_messages.extend(keep_newer(page, watermark));

        if oldest <= watermark {
            break;
        }
    }

    Ok(new_messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::error::CrawlError;
    use futures::future::{ready, Ready};

    fn message(id: i64) -> FetchedMessage {
        FetchedMessage {
            id,
            created_at: Utc::now(),
            lang: None,
            text: format!("message {id}"),
            raw: Vec::new(),
        }
    }

    fn ids_ready(page: RelationshipPage) -> Ready<Result<RelationshipPage>> {
        ready(Ok(page))
    }

    fn messages_ready(ids: impl IntoIterator<Item = i64>) -> Ready<Result<Vec<FetchedMessage>>> {
        ready(Ok(ids.into_iter().map(message).collect()))
    }

    fn page(ids: &[i64], next_cursor: i64) -> RelationshipPage {
        RelationshipPage {
            ids: ids.to_vec(),
            next_cursor,
        }
    }

    #[test]
    fn trim_stops_at_watermark() {
        assert_eq!(trim_till_id(&[5, 4, 3, 2, 1], 3), (&[5, 4][..], true));
    }

    #[test]
    fn trim_keeps_everything_when_watermark_absent() {
        assert_eq!(trim_till_id(&[5, 4, 3, 2, 1], 9), (&[5, 4, 3, 2, 1][..], false));
    }

    #[test]
    fn trim_of_empty_page() {
        assert_eq!(trim_till_id(&[], 3), (&[][..], false));
    }

    #[test]
    fn zero_watermark_never_matches() {
        assert_eq!(trim_till_id(&[2, 0, 1], 0), (&[2, 0, 1][..], false));
    }

    #[tokio::test]
    async fn empty_feed_costs_one_fetch() {
        let mut cursors = Vec::new();
        let ids = collect_new_ids(3, |cursor| {
            cursors.push(cursor);
            ids_ready(RelationshipPage::default())
        })
        .await
        .unwrap();

        assert!(ids.is_empty());
        assert_eq!(cursors, vec![START_CURSOR]);
    }

    #[tokio::test]
    async fn id_walk_stops_on_watermark_even_with_more_pages() {
        let mut pages = vec![page(&[9, 8, 7], 11), page(&[6, 5, 4], 12), page(&[3], 0)].into_iter();
        let mut cursors = Vec::new();
        let ids = collect_new_ids(5, |cursor| {
            cursors.push(cursor);
            ids_ready(pages.next().unwrap_or_default())
        })
        .await
        .unwrap();

        assert_eq!(ids, vec![9, 8, 7, 6]);
        assert_eq!(cursors, vec![START_CURSOR, 11]);
    }

    #[tokio::test]
    async fn id_walk_stops_on_end_cursor() {
        let mut pages = vec![page(&[9, 8], 0), page(&[7], 0)].into_iter();
        let mut fetches = 0;
        let ids = collect_new_ids(0, |_| {
            fetches += 1;
            ids_ready(pages.next().unwrap_or_default())
        })
        .await
        .unwrap();

        assert_eq!(ids, vec![9, 8]);
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn id_walk_propagates_errors() {
        let result = collect_new_ids(0, |_| {
            ready(Err::<RelationshipPage, _>(CrawlError::network(
                "relationship_page",
                Some(500),
                "boom",
            )))
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn message_walk_stops_once_watermark_reached() {
        let mut anchors = Vec::new();
        let kept = collect_new_messages(100, |max_id| {
            anchors.push(max_id);
            messages_ready([150, 120, 100, 90])
        })
        .await
        .unwrap();

        let ids: Vec<i64> = kept.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![150, 120]);
        assert_eq!(anchors, vec![0]);
    }

    #[tokio::test]
    async fn message_walk_anchors_on_oldest_seen() {
        let mut pages = vec![vec![300, 250], vec![200, 150], vec![120, 80]].into_iter();
        let mut anchors = Vec::new();
        let kept = collect_new_messages(100, |max_id| {
            anchors.push(max_id);
            messages_ready(pages.next().unwrap_or_default())
        })
        .await
        .unwrap();

        let ids: Vec<i64> = kept.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![300, 250, 200, 150, 120]);
        assert_eq!(anchors, vec![0, 250, 150]);
    }

    #[tokio::test]
    async fn message_walk_with_nothing_new_fetches_once() {
        let mut fetches = 0;
        let kept = collect_new_messages(500, |_| {
            fetches += 1;
            messages_ready([400, 300])
        })
        .await
        .unwrap();

        assert!(kept.is_empty());
        assert_eq!(fetches, 1);
    }

    #[tokio::test]
    async fn message_walk_stops_if_feed_repeats() {
        let mut fetches = 0;
        let kept = collect_new_messages(0, |_| {
            fetches += 1;
            messages_ready([20, 10])
        })
        .await
        .unwrap();

        assert_eq!(kept.len(), 2);
        assert_eq!(fetches, 2);
    }
}
