//! Rate-limited REST client for the social graph API.
//!
//! Covers the five calls a graph crawler needs: single and bulk profile
//! lookup, cursored following/follower ID listings, and user timelines.
//! Every request waits for its endpoint's allowance before it is sent, and
//! transient failures are retried a bounded number of times.
//!
//! # Example
//!
//! ```rust,ignore
//! use social_api::{Credentials, SocialApiClient, UserRef};
//!
//! let creds = Credentials::from_file("auth.json".as_ref())?;
//! let client = SocialApiClient::new(creds, std::time::Duration::from_secs(900));
//!
//! let user = client.show_user(UserRef::ScreenName("rustlang")).await?;
//! println!("{} has id {}", user.user.screen_name, user.user.id);
//! ```

pub mod credentials;
pub mod error;
pub mod rate_limit;
pub mod types;

pub use credentials::Credentials;
pub use error::{Result, SocialApiError};
pub use rate_limit::{Endpoint, RateLimits};
pub use types::{IdPage, StatusObject, StatusSnapshot, UserObject, UserRef, UserSnapshot};

use std::time::Duration;

use reqwest::StatusCode;

const BASE_URL: &str = "https://api.twitter.com/1.1";

/// Maximum number of user IDs accepted by a bulk lookup.
pub const MAX_LOOKUP_BATCH: usize = 100;

/// Statuses requested per timeline page.
const TIMELINE_PAGE_SIZE: u32 = 200;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 500;

pub struct SocialApiClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    limits: RateLimits,
    window: Duration,
}

impl SocialApiClient {
    pub fn new(credentials: Credentials, window: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
            credentials,
            limits: RateLimits::new(window),
            window,
        }
    }

    /// Point the client at a different API root (staging, local fakes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch one user.
    pub async fn show_user(&self, user: UserRef<'_>) -> Result<UserSnapshot> {
        let body = self
            .get(Endpoint::UsersShow, vec![user.query_param()])
            .await?;
        types::parse_user(&body)
    }

    /// Fetch up to [`MAX_LOOKUP_BATCH`] users in one request. Unknown or
    /// suspended IDs are silently absent from the result.
    pub async fn lookup_users(&self, ids: &[i64]) -> Result<Vec<UserSnapshot>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        if ids.len() > MAX_LOOKUP_BATCH {
            return Err(SocialApiError::BatchTooLarge {
                len: ids.len(),
                max: MAX_LOOKUP_BATCH,
            });
        }

        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let body = self
            .get(Endpoint::UsersLookup, vec![("user_id", joined)])
            .await?;
        types::parse_users(&body)
    }

    /// One page of the IDs `user` is following.
    pub async fn friend_ids(&self, user: UserRef<'_>, cursor: i64) -> Result<IdPage> {
        self.id_page(Endpoint::FriendIds, user, cursor).await
    }

    /// One page of the IDs following `user`.
    pub async fn follower_ids(&self, user: UserRef<'_>, cursor: i64) -> Result<IdPage> {
        self.id_page(Endpoint::FollowerIds, user, cursor).await
    }

    /// One page of `user`'s timeline, newest first. `max_id = 0` asks for the
    /// most recent page; otherwise only statuses strictly older than `max_id`
    /// are returned.
    pub async fn user_timeline(&self, user: UserRef<'_>, max_id: i64) -> Result<Vec<StatusSnapshot>> {
        let mut params = vec![
            user.query_param(),
            ("trim_user", "true".to_string()),
            ("count", TIMELINE_PAGE_SIZE.to_string()),
        ];
        if max_id != 0 {
            params.push(("max_id", (max_id - 1).to_string()));
        }

        let body = self.get(Endpoint::UserTimeline, params).await?;
        types::parse_statuses(&body)
    }

    async fn id_page(&self, endpoint: Endpoint, user: UserRef<'_>, cursor: i64) -> Result<IdPage> {
        // Cursor 0 means the traversal already ended.
        if cursor == 0 {
            return Ok(IdPage::default());
        }

        let params = vec![user.query_param(), ("cursor", cursor.to_string())];
        let body = self.get(endpoint, params).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Issue a GET against `endpoint`, honouring its rate limit and retrying
    /// transient failures.
    async fn get(&self, endpoint: Endpoint, params: Vec<(&'static str, String)>) -> Result<String> {
        let url = format!("{}/{}", self.base_url, endpoint.path());
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.limits.until_ready(endpoint).await;

            let result = self
                .client
                .get(&url)
                .bearer_auth(self.credentials.bearer_token())
                .query(&params)
                .send()
                .await;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(endpoint = endpoint.path(), attempt, error = %e, "Request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64)).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= MAX_ATTEMPTS {
                    return Err(SocialApiError::RateLimited {
                        endpoint: endpoint.path(),
                    });
                }
                let wait = self.reset_wait(resp.headers());
                tracing::warn!(
                    endpoint = endpoint.path(),
                    wait_secs = wait.as_secs(),
                    "Rate limited by API, waiting for window reset"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                let err = SocialApiError::Api {
                    status: status.as_u16(),
                    message: body,
                };
                if err.is_transient() && attempt < MAX_ATTEMPTS {
                    tracing::warn!(endpoint = endpoint.path(), attempt, error = %err, "Server error, retrying");
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64)).await;
                    continue;
                }
                return Err(err);
            }

            tracing::trace!(endpoint = endpoint.path(), "Request succeeded");
            return Ok(resp.text().await?);
        }
    }

    /// Time until the window advertised in `x-rate-limit-reset` rolls over,
    /// clamped to `[1s, window]`.
    fn reset_wait(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        let reset_at = headers
            .get("x-rate-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        let secs = match reset_at {
            Some(reset_at) => (reset_at - chrono::Utc::now().timestamp()).max(1) as u64,
            None => self.window.as_secs(),
        };
        Duration::from_secs(secs).clamp(Duration::from_secs(1), self.window.max(Duration::from_secs(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SocialApiClient {
        SocialApiClient::new(Credentials::new("token"), Duration::from_secs(900))
    }

    #[tokio::test]
    async fn exhausted_cursor_returns_empty_page_without_request() {
        // Unroutable base URL: any request would fail.
        let client = client().with_base_url("http://127.0.0.1:9");
        let page = client.friend_ids(UserRef::UserId(1), 0).await.unwrap();
        assert!(page.ids.is_empty());
        assert_eq!(page.next_cursor, 0);
    }

    #[tokio::test]
    async fn oversized_lookup_is_rejected() {
        let ids: Vec<i64> = (0..101).collect();
        let err = client().lookup_users(&ids).await.unwrap_err();
        assert!(matches!(err, SocialApiError::BatchTooLarge { len: 101, max: 100 }));
    }

    #[tokio::test]
    async fn empty_lookup_is_a_no_op() {
        let client = client().with_base_url("http://127.0.0.1:9");
        assert!(client.lookup_users(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn reset_wait_is_clamped_to_window() {
        let client = client();
        let mut headers = reqwest::header::HeaderMap::new();
        let far_future = chrono::Utc::now().timestamp() + 10_000;
        headers.insert("x-rate-limit-reset", far_future.to_string().parse().unwrap());
        assert_eq!(client.reset_wait(&headers), Duration::from_secs(900));
    }

    #[test]
    fn reset_wait_defaults_to_window_without_header() {
        let client = client();
        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(client.reset_wait(&headers), Duration::from_secs(900));
    }
}
