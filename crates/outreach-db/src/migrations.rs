use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, applications)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL,
                access_token    TEXT,
                refresh_token   TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_users_email ON users(lower(email));

            CREATE TABLE applications (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                counterparty_name   TEXT NOT NULL,
                counterparty_email  TEXT NOT NULL,
                role                TEXT NOT NULL,
                company             TEXT,
                source              TEXT NOT NULL,
                thread_id           TEXT UNIQUE,
                message_id          TEXT,
                status              TEXT NOT NULL,
                sent_at             TEXT NOT NULL
            );

            CREATE INDEX idx_applications_owner
                ON applications(user_id, sent_at);

            CREATE INDEX idx_applications_status
                ON applications(status);

            -- A thread id is the correlation key; once set it never changes.
            CREATE TRIGGER applications_thread_id_immutable
                BEFORE UPDATE OF thread_id ON applications
                WHEN OLD.thread_id IS NOT NULL AND NEW.thread_id IS NOT OLD.thread_id
            BEGIN
                SELECT RAISE(ABORT, 'thread_id is immutable');
            END;

            CREATE TRIGGER applications_status_forward_only
                BEFORE UPDATE OF status ON applications
                WHEN NEW.status IS NOT OLD.status
                 AND NOT (OLD.status = 'Not Applied' AND NEW.status = 'Awaiting Reply')
                 AND NOT (OLD.status = 'Awaiting Reply' AND NEW.status = 'Got a Reply')
            BEGIN
                SELECT RAISE(ABORT, 'status may only advance');
            END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
