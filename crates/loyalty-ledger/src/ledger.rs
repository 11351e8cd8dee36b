use std::sync::Arc;

use tracing::{debug, info, warn};

use loyalty_db::Database;
use loyalty_types::models::{
    ChannelInfo, CheerEvent, SubscriptionEvent, UserInfo, renewal_window,
};

use crate::clock::{Clock, SystemClock};
use crate::error::LedgerError;
use crate::locks::UserLocks;

/// The ledger operations the chat bot relies on.
pub trait LoyaltyRepo: Send + Sync {
    fn subscribe(&self, username: &str) -> Result<(), LedgerError>;

    /// Gift a subscription to `recipient`, paid for by `gifter`.
    fn gift(&self, recipient: &str, gifter: &str) -> Result<(), LedgerError>;

    fn cheer(&self, username: &str, amount: i64) -> Result<(), LedgerError>;

    /// Never fails: a field whose query errors reads as zero.
    fn user_info(&self, username: &str) -> UserInfo;

    /// Never fails: a field whose query errors reads as zero.
    fn channel_info(&self) -> ChannelInfo;
}

pub struct LoyaltyLedger {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    locks: UserLocks,
}

impl LoyaltyLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            clock,
            locks: UserLocks::new(),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Insert `event` unless its recipient is still inside the renewal window.
    ///
    /// The per-user lock keeps two renewals for one recipient from
    /// interleaving; the store transaction makes the check and the insert a
    /// single unit against other writers of the same file.
    fn renew(&self, event: SubscriptionEvent) -> Result<(), LedgerError> {
        let _guard = self.locks.lock(&event.username);

        self.db.transaction(|tx| {
            if let Some(previous) = tx.most_recent_subscription(&event.username)? {
                if previous.blocks_renewal_at(event.created_at) {
                    debug!(
                        "{} already subscribed at {}",
                        event.username, previous.created_at
                    );
                    return Err(LedgerError::AlreadySubscribed);
                }
            }
            tx.insert_subscription(&event)?;
            Ok(())
        })
    }
}

impl LoyaltyRepo for LoyaltyLedger {
    fn subscribe(&self, username: &str) -> Result<(), LedgerError> {
        self.renew(SubscriptionEvent::new(username, self.clock.now()))?;
        info!("{} subscribed", username);
        Ok(())
    }

    fn gift(&self, recipient: &str, gifter: &str) -> Result<(), LedgerError> {
        self.renew(SubscriptionEvent::gifted(recipient, gifter, self.clock.now()))?;
        info!("{} gifted a sub to {}", gifter, recipient);
        Ok(())
    }

    fn cheer(&self, username: &str, amount: i64) -> Result<(), LedgerError> {
        self.db.insert_cheer(&CheerEvent {
            created_at: self.clock.now(),
            username: username.to_string(),
            amount,
        })?;
        info!("{} cheered {} bits", username, amount);
        Ok(())
    }

    fn user_info(&self, username: &str) -> UserInfo {
        let latest = or_zero("latest sub", self.db.most_recent_subscription(username));

        UserInfo {
            last_sub: latest.as_ref().map(|sub| sub.created_at),
            subbed_from: latest.and_then(|sub| sub.giftee),
            months_subbed: or_zero("months subbed", self.db.count_subscriptions(username)),
            gifts_given: or_zero("gifts given", self.db.count_gifts_given(username)),
            gifts_received: or_zero("gifts received", self.db.count_gifts_received(username)),
            bits_cheered: or_zero("bits cheered", self.db.sum_cheers(username)),
        }
    }

    fn channel_info(&self) -> ChannelInfo {
        let cutoff = self.clock.now() - renewal_window();

        ChannelInfo {
            active_subs: or_zero("active subs", self.db.count_subscriptions_since(cutoff)),
            total_gifts: or_zero("total gifts", self.db.count_gifted_total()),
            total_cheers: or_zero("total cheers", self.db.sum_cheers_total()),
        }
    }
}

fn or_zero<T: Default>(field: &str, result: anyhow::Result<T>) -> T {
    result.unwrap_or_else(|e| {
        warn!("Failed to read {}: {:#}", field, e);
        T::default()
    })
}
