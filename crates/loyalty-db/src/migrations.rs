use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (subs + cheers)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS subs (
                created_at  INTEGER NOT NULL,
                username    TEXT NOT NULL,
                giftee      TEXT,
                tier        INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_subs_username
                ON subs(username, created_at);

            CREATE INDEX IF NOT EXISTS idx_subs_giftee
                ON subs(giftee);

            CREATE TABLE IF NOT EXISTS cheers (
                created_at  INTEGER NOT NULL,
                username    TEXT NOT NULL,
                amount      INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cheers_username
                ON cheers(username);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
