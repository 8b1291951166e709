//! Per-endpoint rate limiting.
//!
//! Every endpoint has its own request allowance per rate-limit window. The
//! allowance is modelled as a governor quota whose burst equals the allowance
//! and which replenishes one request every `window / allowance`.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// The API endpoints the client calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    UsersShow,
    UsersLookup,
    FriendIds,
    FollowerIds,
    UserTimeline,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::UsersShow,
        Endpoint::UsersLookup,
        Endpoint::FriendIds,
        Endpoint::FollowerIds,
        Endpoint::UserTimeline,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::UsersShow => "users/show.json",
            Endpoint::UsersLookup => "users/lookup.json",
            Endpoint::FriendIds => "friends/ids.json",
            Endpoint::FollowerIds => "followers/ids.json",
            Endpoint::UserTimeline => "statuses/user_timeline.json",
        }
    }

    /// Requests allowed per rate-limit window with app-only auth.
    pub fn requests_per_window(&self) -> u32 {
        match self {
            Endpoint::UsersShow => 900,
            Endpoint::UsersLookup => 300,
            Endpoint::FriendIds => 15,
            Endpoint::FollowerIds => 15,
            Endpoint::UserTimeline => 1500,
        }
    }
}

pub struct RateLimits {
    limiters: HashMap<Endpoint, DirectRateLimiter>,
}

impl RateLimits {
    pub fn new(window: Duration) -> Self {
        let limiters = Endpoint::ALL
            .iter()
            .map(|endpoint| {
                let allowance = NonZeroU32::new(endpoint.requests_per_window())
                    .unwrap_or(NonZeroU32::MIN);
                let quota = Quota::with_period(window / allowance.get())
                    .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
                    .allow_burst(allowance);
                (*endpoint, RateLimiter::direct(quota))
            })
            .collect();
        Self { limiters }
    }

    /// Wait until the endpoint has allowance left.
    pub async fn until_ready(&self, endpoint: Endpoint) {
        if let Some(limiter) = self.limiters.get(&endpoint) {
            limiter.until_ready().await;
        }
    }

    /// Take one request of allowance without waiting; false when exhausted.
    pub fn try_acquire(&self, endpoint: Endpoint) -> bool {
        self.limiters
            .get(&endpoint)
            .map(|limiter| limiter.check().is_ok())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_matches_window_allowance() {
        let limits = RateLimits::new(Duration::from_secs(900));
        for _ in 0..15 {
            assert!(limits.try_acquire(Endpoint::FriendIds));
        }
        assert!(!limits.try_acquire(Endpoint::FriendIds));
    }

    #[test]
    fn endpoints_are_limited_independently() {
        let limits = RateLimits::new(Duration::from_secs(900));
        for _ in 0..15 {
            assert!(limits.try_acquire(Endpoint::FollowerIds));
        }
        assert!(!limits.try_acquire(Endpoint::FollowerIds));
        assert!(limits.try_acquire(Endpoint::FriendIds));
        assert!(limits.try_acquire(Endpoint::UsersShow));
    }
}
