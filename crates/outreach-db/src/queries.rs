use crate::Database;
use crate::models::{ApplicationRow, NewApplication, ReplyCandidate, UserRow};
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use outreach_types::models::ApplicationStatus;
use rusqlite::{Connection, Row};

const APPLICATION_COLUMNS: &str = "id, user_id, counterparty_name, counterparty_email, role, company, \
     source, thread_id, message_id, status, sent_at";

impl Database {
    // -- Users --

    /// Insert the user if this id has never been seen. Existing rows,
    /// including their credentials, are left alone.
    pub fn ensure_user(&self, id: &str, email: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
                (id, email),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "WHERE id = ?1", id))
    }

    /// Case-insensitive lookup, used to map mailbox push notifications to a user.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "WHERE lower(email) = lower(?1)", email))
    }

    /// Persist a freshly authorized credential pair. A missing refresh token
    /// keeps whatever was stored before.
    pub fn store_credentials(
        &self,
        id: &str,
        email: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, access_token, refresh_token) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    email = excluded.email,
                    access_token = excluded.access_token,
                    refresh_token = COALESCE(excluded.refresh_token, users.refresh_token),
                    updated_at = datetime('now')",
                rusqlite::params![id, email, access_token, refresh_token],
            )?;
            Ok(())
        })
    }

    /// Record the outcome of a token refresh.
    pub fn update_access_token(
        &self,
        id: &str,
        access_token: &str,
        rotated_refresh_token: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET
                    access_token = ?2,
                    refresh_token = COALESCE(?3, refresh_token),
                    updated_at = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![id, access_token, rotated_refresh_token],
            )?;
            Ok(())
        })
    }

    // -- Applications --

    pub fn insert_application(&self, app: &NewApplication<'_>) -> Result<ApplicationRow> {
        let sent_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO applications
                    (id, user_id, counterparty_name, counterparty_email, role, company,
                     source, thread_id, message_id, status, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    app.id,
                    app.user_id,
                    app.counterparty_name,
                    app.counterparty_email,
                    app.role,
                    app.company,
                    app.source.as_str(),
                    app.thread_id,
                    app.message_id,
                    app.status.as_str(),
                    sent_at,
                ],
            )?;

            Ok(ApplicationRow {
                id: app.id.to_string(),
                user_id: app.user_id.to_string(),
                counterparty_name: app.counterparty_name.to_string(),
                counterparty_email: app.counterparty_email.to_string(),
                role: app.role.to_string(),
                company: app.company.map(str::to_string),
                source: app.source.as_str().to_string(),
                thread_id: app.thread_id.map(str::to_string),
                message_id: app.message_id.map(str::to_string),
                status: app.status.as_str().to_string(),
                sent_at,
            })
        })
    }

    pub fn get_application(&self, id: &str) -> Result<Option<ApplicationRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM applications WHERE id = ?1", APPLICATION_COLUMNS);
            conn.query_row(&sql, [id], application_from_row).optional()
        })
    }

    /// All records owned by a user, newest first.
    pub fn list_applications_by_owner(&self, user_id: &str) -> Result<Vec<ApplicationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM applications WHERE user_id = ?1 ORDER BY sent_at DESC, rowid DESC",
                APPLICATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], application_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn find_by_thread_id(&self, thread_id: &str) -> Result<Option<ApplicationRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM applications WHERE thread_id = ?1", APPLICATION_COLUMNS);
            conn.query_row(&sql, [thread_id], application_from_row).optional()
        })
    }

    /// Close the record correlated with `thread_id`: `Awaiting Reply` becomes
    /// `Got a Reply` in one conditional statement.
    ///
    /// Returns the updated row only when this call performed the transition.
    /// A record that is already closed, never sent, or unknown yields `None`,
    /// so concurrent callers race harmlessly and exactly one of them sees `Some`.
    pub fn mark_replied(&self, thread_id: &str) -> Result<Option<ApplicationRow>> {
        self.with_conn_mut(|conn| {
            let sql = format!(
                "UPDATE applications SET status = ?2
                 WHERE thread_id = ?1 AND status = ?3
                 RETURNING {}",
                APPLICATION_COLUMNS
            );
            conn.query_row(
                &sql,
                rusqlite::params![
                    thread_id,
                    ApplicationStatus::GotReply.as_str(),
                    ApplicationStatus::AwaitingReply.as_str(),
                ],
                application_from_row,
            )
            .optional()
        })
    }

    /// Attach a completed send to a `Not Applied` placeholder owned by
    /// `user_id`, moving it to `Awaiting Reply` and stamping the send time. Returns `None` when the record
    /// is missing, owned by someone else, or already past `Not Applied`.
    pub fn promote_to_awaiting(
        &self,
        id: &str,
        user_id: &str,
        thread_id: &str,
        message_id: &str,
    ) -> Result<Option<ApplicationRow>> {
        let sent_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.with_conn_mut(|conn| {
            let sql = format!(
                "UPDATE applications SET status = ?5, thread_id = ?3, message_id = ?4, sent_at = ?7
                 WHERE id = ?1 AND user_id = ?2 AND status = ?6 AND thread_id IS NULL
                 RETURNING {}",
                APPLICATION_COLUMNS
            );
            conn.query_row(
                &sql,
                rusqlite::params![
                    id,
                    user_id,
                    thread_id,
                    message_id,
                    ApplicationStatus::AwaitingReply.as_str(),
                    ApplicationStatus::NotApplied.as_str(),
                    sent_at,
                ],
                application_from_row,
            )
            .optional()
        })
    }

    /// Every record the reply poller should check: awaiting a reply, carrying
    /// a thread id, and owned by a user with a refresh token on file.
    pub fn reply_candidates(&self) -> Result<Vec<ReplyCandidate>> {
        self.with_conn(|conn| query_reply_candidates(conn, CandidateFilter::All))
    }

    /// Same as [`Database::reply_candidates`], restricted to one owner.
    pub fn reply_candidates_for_user(&self, user_id: &str) -> Result<Vec<ReplyCandidate>> {
        self.with_conn(|conn| query_reply_candidates(conn, CandidateFilter::Owner(user_id)))
    }

    /// The record on `thread_id`, if it is one the poller would check.
    pub fn reply_candidate_for_thread(&self, thread_id: &str) -> Result<Option<ReplyCandidate>> {
        self.with_conn(|conn| {
            let mut rows = query_reply_candidates(conn, CandidateFilter::Thread(thread_id))?;
            Ok(rows.pop())
        })
    }
}

fn query_user(conn: &Connection, filter: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, email, access_token, refresh_token, created_at FROM users {}",
        filter
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                access_token: row.get(2)?,
                refresh_token: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

enum CandidateFilter<'a> {
    All,
    Owner(&'a str),
    Thread(&'a str),
}

fn query_reply_candidates(conn: &Connection, filter: CandidateFilter<'_>) -> Result<Vec<ReplyCandidate>> {
    let (user_id, thread_id) = match filter {
        CandidateFilter::All => (None, None),
        CandidateFilter::Owner(user_id) => (Some(user_id), None),
        CandidateFilter::Thread(thread_id) => (None, Some(thread_id)),
    };

    let mut stmt = conn.prepare(
        "SELECT a.id, a.user_id, u.email, a.thread_id, a.counterparty_name
         FROM applications a
         JOIN users u ON a.user_id = u.id
         WHERE a.status = ?1
           AND a.thread_id IS NOT NULL AND a.thread_id != ''
           AND u.refresh_token IS NOT NULL AND u.refresh_token != ''
           AND (?2 IS NULL OR a.user_id = ?2)
           AND (?3 IS NULL OR a.thread_id = ?3)
         ORDER BY a.sent_at",
    )?;

    let rows = stmt
        .query_map(
            rusqlite::params![ApplicationStatus::AwaitingReply.as_str(), user_id, thread_id],
            |row| {
                Ok(ReplyCandidate {
                    application_id: row.get(0)?,
                    user_id: row.get(1)?,
                    user_email: row.get(2)?,
                    thread_id: row.get(3)?,
                    counterparty_name: row.get(4)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<ApplicationRow> {
    Ok(ApplicationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        counterparty_name: row.get(2)?,
        counterparty_email: row.get(3)?,
        role: row.get(4)?,
        company: row.get(5)?,
        source: row.get(6)?,
        thread_id: row.get(7)?,
        message_id: row.get(8)?,
        status: row.get(9)?,
        sent_at: row.get(10)?,
    })
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
