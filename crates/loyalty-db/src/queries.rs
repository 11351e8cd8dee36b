use crate::Database;
use crate::models::SubscriptionRow;
use anyhow::Result;
use chrono::{DateTime, Utc};
use loyalty_types::models::{CheerEvent, SubscriptionEvent};
use rusqlite::{Connection, Transaction};

impl Database {
    // -- Subscriptions --

    pub fn insert_subscription(&self, event: &SubscriptionEvent) -> Result<()> {
        self.with_conn_mut(|conn| insert_subscription(conn, event))
    }

    pub fn count_subscriptions(&self, username: &str) -> Result<i64> {
        self.with_conn(|conn| {
            count(conn, "SELECT COUNT(*) FROM subs WHERE username = ?1", [username])
        })
    }

    /// Subscriptions this user paid for on behalf of someone else.
    pub fn count_gifts_given(&self, gifter: &str) -> Result<i64> {
        self.with_conn(|conn| count(conn, "SELECT COUNT(*) FROM subs WHERE giftee = ?1", [gifter]))
    }

    /// Subscriptions this user received as a gift.
    pub fn count_gifts_received(&self, username: &str) -> Result<i64> {
        self.with_conn(|conn| {
            count(
                conn,
                "SELECT COUNT(*) FROM subs WHERE username = ?1 AND giftee IS NOT NULL",
                [username],
            )
        })
    }

    pub fn count_gifted_total(&self) -> Result<i64> {
        self.with_conn(|conn| count(conn, "SELECT COUNT(*) FROM subs WHERE giftee IS NOT NULL", []))
    }

    /// Distinct recipients with a subscription row newer than `cutoff`.
    pub fn count_subscriptions_since(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        self.with_conn(|conn| {
            count(
                conn,
                "SELECT COUNT(DISTINCT username) FROM subs WHERE created_at > ?1",
                [cutoff.timestamp()],
            )
        })
    }

    pub fn most_recent_subscription(&self, username: &str) -> Result<Option<SubscriptionEvent>> {
        self.with_conn(|conn| query_most_recent_subscription(conn, username))
    }

    // -- Cheers --

    pub fn insert_cheer(&self, event: &CheerEvent) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO cheers (created_at, username, amount) VALUES (?1, ?2, ?3)",
                rusqlite::params![event.created_at.timestamp(), event.username, event.amount],
            )?;
            Ok(())
        })
    }

    pub fn sum_cheers(&self, username: &str) -> Result<i64> {
        self.with_conn(|conn| {
            count(
                conn,
                "SELECT COALESCE(SUM(amount), 0) FROM cheers WHERE username = ?1",
                [username],
            )
        })
    }

    pub fn sum_cheers_total(&self) -> Result<i64> {
        self.with_conn(|conn| count(conn, "SELECT COALESCE(SUM(amount), 0) FROM cheers", []))
    }
}

/// Handle given to the closure of [`Database::transaction`].
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> StoreTx<'conn> {
    pub(crate) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    pub(crate) fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn most_recent_subscription(&self, username: &str) -> Result<Option<SubscriptionEvent>> {
        query_most_recent_subscription(&self.tx, username)
    }

    pub fn insert_subscription(&self, event: &SubscriptionEvent) -> Result<()> {
        insert_subscription(&self.tx, event)
    }
}

fn insert_subscription(conn: &Connection, event: &SubscriptionEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO subs (created_at, username, giftee, tier) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            event.created_at.timestamp(),
            event.username,
            event.giftee,
            event.tier
        ],
    )?;
    Ok(())
}

fn query_most_recent_subscription(
    conn: &Connection,
    username: &str,
) -> Result<Option<SubscriptionEvent>> {
    let mut stmt = conn.prepare(
        "SELECT created_at, username, giftee, tier FROM subs
         WHERE username = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT 1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(SubscriptionRow {
                created_at: row.get(0)?,
                username: row.get(1)?,
                giftee: row.get(2)?,
                tier: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row.map(SubscriptionEvent::from))
}

/// Single-value COUNT/SUM query. NULL results read as zero.
fn count<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<i64> {
    let value: Option<i64> = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(value.unwrap_or(0))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn cheer(username: &str, amount: i64) -> CheerEvent {
        CheerEvent { created_at: at(1_700_000_000), username: username.into(), amount }
    }

    #[test]
    fn test_empty_aggregates_are_zero() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.count_subscriptions("nobody").unwrap(), 0);
        assert_eq!(db.count_gifts_given("nobody").unwrap(), 0);
        assert_eq!(db.count_gifts_received("nobody").unwrap(), 0);
        assert_eq!(db.count_gifted_total().unwrap(), 0);
        assert_eq!(db.sum_cheers("nobody").unwrap(), 0);
        assert_eq!(db.sum_cheers_total().unwrap(), 0);
        assert_eq!(db.count_subscriptions_since(at(0)).unwrap(), 0);
        assert!(db.most_recent_subscription("nobody").unwrap().is_none());
    }

    #[test]
    fn test_gift_counts_follow_orientation() {
        let db = Database::open_in_memory().unwrap();
        db.insert_subscription(&SubscriptionEvent::gifted("bob", "alice", at(100))).unwrap();
        db.insert_subscription(&SubscriptionEvent::gifted("carol", "alice", at(200))).unwrap();
        db.insert_subscription(&SubscriptionEvent::new("alice", at(300))).unwrap();

        assert_eq!(db.count_gifts_given("alice").unwrap(), 2);
        assert_eq!(db.count_gifts_given("bob").unwrap(), 0);
        assert_eq!(db.count_gifts_received("bob").unwrap(), 1);
        assert_eq!(db.count_gifts_received("alice").unwrap(), 0);
        assert_eq!(db.count_gifted_total().unwrap(), 2);
        assert_eq!(db.count_subscriptions("alice").unwrap(), 1);
    }

    #[test]
    fn test_most_recent_subscription_orders_by_time() {
        let db = Database::open_in_memory().unwrap();
        db.insert_subscription(&SubscriptionEvent::gifted("bob", "carol", at(500))).unwrap();
        db.insert_subscription(&SubscriptionEvent::new("bob", at(100))).unwrap();

        let latest = db.most_recent_subscription("bob").unwrap().unwrap();
        assert_eq!(latest.created_at, at(500));
        assert_eq!(latest.giftee.as_deref(), Some("carol"));
    }

    #[test]
    fn test_cheer_sums() {
        let db = Database::open_in_memory().unwrap();
        db.insert_cheer(&cheer("alice", 100)).unwrap();
        db.insert_cheer(&cheer("alice", 25)).unwrap();
        db.insert_cheer(&cheer("bob", 1)).unwrap();

        assert_eq!(db.sum_cheers("alice").unwrap(), 125);
        assert_eq!(db.sum_cheers("bob").unwrap(), 1);
        assert_eq!(db.sum_cheers_total().unwrap(), 126);
    }

    #[test]
    fn test_subscriptions_since_counts_distinct_recent_recipients() {
        let db = Database::open_in_memory().unwrap();
        let now = at(10_000_000);
        let month = Duration::days(30);
        db.insert_subscription(&SubscriptionEvent::new("old", now - month - month)).unwrap();
        db.insert_subscription(&SubscriptionEvent::new("fresh", now - Duration::days(2))).unwrap();
        db.insert_subscription(&SubscriptionEvent::gifted("gifted", "old", now)).unwrap();

        assert_eq!(db.count_subscriptions_since(now - month).unwrap(), 2);
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|tx| {
            assert!(tx.most_recent_subscription("alice")?.is_none());
            tx.insert_subscription(&SubscriptionEvent::new("alice", at(100)))
        });
        result.unwrap();
        assert_eq!(db.count_subscriptions("alice").unwrap(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|tx| {
            tx.insert_subscription(&SubscriptionEvent::new("alice", at(100)))?;
            Err(anyhow::anyhow!("changed my mind"))
        });
        assert!(result.is_err());
        assert_eq!(db.count_subscriptions("alice").unwrap(), 0);
    }

    #[test]
    fn test_file_database_readers_see_committed_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("ledger.db")).unwrap();
        db.insert_cheer(&cheer("alice", 7)).unwrap();
        for _ in 0..8 {
            assert_eq!(db.sum_cheers("alice").unwrap(), 7);
        }
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let db = Database::open(&path).unwrap();
            db.insert_subscription(&SubscriptionEvent::new("alice", at(100))).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_subscriptions("alice").unwrap(), 1);
    }
}
