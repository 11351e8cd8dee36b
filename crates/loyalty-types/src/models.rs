use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of the renewal window: a recipient with a subscription row newer
/// than this cannot be subscribed or gifted again.
pub const RENEWAL_WINDOW_SECS: i64 = 30 * 24 * 3600;

/// Tier recorded for every subscription the bot hands out.
pub const DEFAULT_TIER: i64 = 1;

/// Rewards the community "buys" with its cheer total, picked by
/// `total_cheers % TREATS.len()`.
pub const TREATS: [&str; 12] = [
    "teddy bear",
    "hot choccy",
    "blanket",
    "desk plant",
    "wii u",
    "copy of mario maker",
    "rune scim",
    "egg salad",
    "buzzy beetle",
    "mazarati",
    "golden kappa",
    "time machine",
];

pub fn renewal_window() -> Duration {
    Duration::seconds(RENEWAL_WINDOW_SECS)
}

/// One subscription action. `username` is the recipient; `giftee` names the
/// user who paid for it when the row came from a gift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub created_at: DateTime<Utc>,
    pub username: String,
    pub giftee: Option<String>,
    pub tier: i64,
}

impl SubscriptionEvent {
    pub fn new(username: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            username: username.to_string(),
            giftee: None,
            tier: DEFAULT_TIER,
        }
    }

    pub fn gifted(recipient: &str, gifter: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            giftee: Some(gifter.to_string()),
            ..Self::new(recipient, created_at)
        }
    }

    /// True while this row still blocks a renewal for its recipient.
    pub fn blocks_renewal_at(&self, now: DateTime<Utc>) -> bool {
        self.created_at > now - renewal_window()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheerEvent {
    pub created_at: DateTime<Utc>,
    pub username: String,
    pub amount: i64,
}

/// Per-user statistics, derived on demand from the event tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub last_sub: Option<DateTime<Utc>>,
    pub subbed_from: Option<String>,
    /// Number of subscription rows, not elapsed calendar months.
    pub months_subbed: i64,
    pub gifts_given: i64,
    pub gifts_received: i64,
    pub bits_cheered: i64,
}

impl UserInfo {
    pub fn is_subscribed(&self, now: DateTime<Utc>) -> bool {
        self.last_sub.is_some_and(|at| at > now - renewal_window())
    }
}

/// Channel-wide statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub active_subs: i64,
    pub total_gifts: i64,
    pub total_cheers: i64,
}

impl ChannelInfo {
    pub fn treat(&self) -> &'static str {
        let idx = self.total_cheers.rem_euclid(TREATS.len() as i64) as usize;
        TREATS[idx]
    }
}
