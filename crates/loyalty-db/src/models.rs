//! Database row types. Timestamps are stored as unix seconds.

use chrono::DateTime;
use loyalty_types::models::SubscriptionEvent;

pub struct SubscriptionRow {
    pub created_at: i64,
    pub username: String,
    pub giftee: Option<String>,
    pub tier: i64,
}

impl From<SubscriptionRow> for SubscriptionEvent {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            created_at: DateTime::from_timestamp(row.created_at, 0).unwrap_or_default(),
            username: row.username,
            giftee: row.giftee,
            tier: row.tier,
        }
    }
}
