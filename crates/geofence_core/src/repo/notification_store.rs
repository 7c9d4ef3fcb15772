//! Notification store contract and SQLite implementation.
//!
//! # Responsibility
//! - Durable CRUD over notification payloads keyed by identifier.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - At most one row per identifier; writing an existing identifier replaces
//!   the payload in place and keeps its list position.
//! - Every mutation is committed before the call returns; a failed mutation
//!   leaves the table unchanged.
//! - Read paths reject corrupt rows instead of masking them.

use crate::db::DbError;
use crate::model::notification::notification_identifier;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence failure surfaced by notification store operations.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    /// Payload carries no usable `id`/`identifier`.
    MissingIdentifier,
    /// Payload could not be encoded for storage.
    Encode(serde_json::Error),
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingIdentifier => write!(f, "notification payload has no identifier"),
            Self::Encode(err) => write!(f, "failed to encode notification payload: {err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted notification data: {message}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode(err) => Some(err),
            Self::MissingIdentifier | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Which branch an upsert took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Durable keyed collection of notification payloads.
pub trait NotificationStore {
    /// Inserts the payload, or replaces the stored one with the same identifier.
    fn add_or_update_notification(&self, json: &Value) -> StoreResult<UpsertOutcome>;

    /// Inserts a payload. An existing identifier is updated, never duplicated.
    fn add_notification(&self, json: &Value) -> StoreResult<UpsertOutcome> {
        self.add_or_update_notification(json)
    }

    /// Replaces an existing payload. Returns `false` (and writes nothing) when
    /// the identifier is unknown.
    fn update_notification(&self, json: &Value) -> StoreResult<bool>;

    fn notification_for_identifier(&self, identifier: &str) -> StoreResult<Option<Value>>;

    /// Returns every payload in insertion order.
    fn all_notifications(&self) -> StoreResult<Vec<Value>>;

    /// Removes one payload. Returns `false` when nothing was stored under
    /// `identifier`; that is not an error.
    fn remove_notification_for_identifier(&self, identifier: &str) -> StoreResult<bool>;

    /// Clears the collection and returns the number of removed payloads.
    fn remove_all_notifications(&self) -> StoreResult<usize>;

    fn contains_notification(&self, identifier: &str) -> StoreResult<bool> {
        Ok(self.notification_for_identifier(identifier)?.is_some())
    }

    fn notification_count(&self) -> StoreResult<usize> {
        Ok(self.all_notifications()?.len())
    }
}

/// SQLite-backed notification store owning its connection.
pub struct SqliteNotificationStore {
    conn: Connection,
}

impl SqliteNotificationStore {
    /// Wraps a connection returned by `db::open_db`/`db::open_db_in_memory`.
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Gives read access to the underlying connection (diagnostics/tests).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl NotificationStore for SqliteNotificationStore {
    fn add_or_update_notification(&self, json: &Value) -> StoreResult<UpsertOutcome> {
        let identifier = notification_identifier(json).ok_or(StoreError::MissingIdentifier)?;
        let payload = serde_json::to_string(json).map_err(StoreError::Encode)?;

        let tx = self.conn.unchecked_transaction()?;
        let existed = row_exists(&tx, &identifier)?;
        tx.execute(
            "INSERT INTO notifications (identifier, payload)
             VALUES (?1, ?2)
             ON CONFLICT(identifier) DO UPDATE SET
                payload = excluded.payload,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![identifier, payload],
        )?;
        tx.commit()?;

        let outcome = if existed {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        };
        debug!("event=store_upsert module=store status=ok id={identifier} outcome={outcome:?}");
        Ok(outcome)
    }

    fn update_notification(&self, json: &Value) -> StoreResult<bool> {
        let identifier = notification_identifier(json).ok_or(StoreError::MissingIdentifier)?;
        let payload = serde_json::to_string(json).map_err(StoreError::Encode)?;

        let changed = self.conn.execute(
            "UPDATE notifications
             SET
                payload = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE identifier = ?2;",
            params![payload, identifier],
        )?;
        Ok(changed > 0)
    }

    fn notification_for_identifier(&self, identifier: &str) -> StoreResult<Option<Value>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM notifications WHERE identifier = ?1;",
                [identifier.trim()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        payload
            .map(|text| decode_payload(identifier, &text))
            .transpose()
    }

    fn all_notifications(&self) -> StoreResult<Vec<Value>> {
        let mut stmt = self
            .conn
            .prepare("SELECT identifier, payload FROM notifications ORDER BY rowid ASC;")?;
        let mut rows = stmt.query([])?;
        let mut notifications = Vec::new();

        while let Some(row) = rows.next()? {
            let identifier: String = row.get(0)?;
            let payload: String = row.get(1)?;
            notifications.push(decode_payload(&identifier, &payload)?);
        }

        Ok(notifications)
    }

    fn remove_notification_for_identifier(&self, identifier: &str) -> StoreResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM notifications WHERE identifier = ?1;",
            [identifier.trim()],
        )?;
        Ok(changed > 0)
    }

    fn remove_all_notifications(&self) -> StoreResult<usize> {
        let removed = self.conn.execute("DELETE FROM notifications;", [])?;
        debug!("event=store_clear module=store status=ok removed={removed}");
        Ok(removed)
    }

    fn contains_notification(&self, identifier: &str) -> StoreResult<bool> {
        Ok(row_exists(&self.conn, identifier.trim())?)
    }

    fn notification_count(&self) -> StoreResult<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM notifications;", [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| StoreError::InvalidData(format!("negative row count {count}")))
    }
}

fn row_exists(conn: &Connection, identifier: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM notifications WHERE identifier = ?1);",
        [identifier],
        |row| row.get::<_, i64>(0),
    )
    .map(|exists| exists == 1)
}

fn decode_payload(identifier: &str, text: &str) -> StoreResult<Value> {
    let value: Value = serde_json::from_str(text).map_err(|err| {
        StoreError::InvalidData(format!(
            "payload for `{identifier}` is not valid JSON: {err}"
        ))
    })?;
    if !value.is_object() {
        return Err(StoreError::InvalidData(format!(
            "payload for `{identifier}` is not a JSON object"
        )));
    }
    Ok(value)
}
