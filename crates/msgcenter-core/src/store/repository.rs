//! Inbox message storage repository.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use msgcenter_api::{MessageId, Mutation};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use super::model::Message;
use crate::{Error, Result};

const SELECT_COLUMNS: &str = r"
    SELECT id, created_at, expires_at, is_read, is_deleted, dirty, body_ref, title, extra_json
    FROM messages
";

/// Repository for cached inbox messages.
///
/// Server-reported state never overwrites a record with `dirty` set; only an
/// acknowledgment clears `dirty`. Batch operations run in one transaction.
#[derive(Debug, Clone)]
pub struct InboxStore {
    pool: SqlitePool,
}

impl InboxStore {
    /// Creates the store on `pool`, creating its tables if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        // Timestamps are microseconds since the epoch so they sort numerically.
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                is_read INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                dirty INTEGER NOT NULL DEFAULT 0,
                body_ref TEXT NOT NULL DEFAULT '',
                title TEXT,
                extra_json TEXT NOT NULL DEFAULT '{}'
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at DESC)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts new records and refreshes existing ones from server state.
    ///
    /// `is_read` and `is_deleted` are only taken from `messages` for records
    /// that are not dirty. `dirty` itself is never changed here.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails; nothing is written then.
    pub async fn upsert(&self, messages: &[Message]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for message in messages {
            let extra_json = serde_json::to_string(&message.extra)?;
            sqlx::query(
                r"
                INSERT INTO messages
                    (id, created_at, expires_at, is_read, is_deleted, dirty, body_ref, title, extra_json)
                VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at,
                    body_ref = excluded.body_ref,
                    title = excluded.title,
                    extra_json = excluded.extra_json,
                    is_read = CASE WHEN messages.dirty THEN messages.is_read ELSE excluded.is_read END,
                    is_deleted = CASE WHEN messages.dirty THEN messages.is_deleted ELSE excluded.is_deleted END
                ",
            )
            .bind(message.id.as_str())
            .bind(message.created_at.timestamp_micros())
            .bind(message.expires_at.map(|t| t.timestamp_micros()))
            .bind(message.is_read)
            .bind(message.is_deleted)
            .bind(&message.body_ref)
            .bind(message.title.as_deref())
            .bind(extra_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Store: upserted {} message(s)", messages.len());
        Ok(())
    }

    /// Marks a message read locally, pending acknowledgment.
    ///
    /// Returns false if the message is unknown, deleted, or already read.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_locally_read(&self, id: &MessageId) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE messages SET is_read = 1, dirty = 1
            WHERE id = ? AND is_read = 0 AND is_deleted = 0
            ",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Tombstones a message locally, pending acknowledgment.
    ///
    /// Returns false if the message is unknown or already deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_locally_deleted(&self, id: &MessageId) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE messages SET is_deleted = 1, dirty = 1
            WHERE id = ? AND is_deleted = 0
            ",
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drops `ids` from the retry set after the service refused `mutation`.
    ///
    /// Only records whose pending change is still `mutation` are cleared, so
    /// a delete made while a read was in flight stays pending. Local values
    /// are kept; the next listing overwrites them. Returns the number of
    /// records cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails; nothing is written then.
    pub async fn reject(&self, ids: &[MessageId], mutation: Mutation) -> Result<u64> {
        let statement = match mutation {
            Mutation::MarkRead => {
                "UPDATE messages SET dirty = 0 WHERE id = ? AND dirty = 1 AND is_deleted = 0"
            }
            Mutation::Delete => {
                "UPDATE messages SET dirty = 0 WHERE id = ? AND dirty = 1 AND is_deleted = 1"
            }
        };

        let mut tx = self.pool.begin().await?;
        let mut cleared = 0;
        for id in ids {
            cleared += sqlx::query(statement)
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(cleared)
    }

    /// Applies a server acknowledgment of `mutation` for `ids`.
    ///
    /// A read acknowledgment clears `dirty` only where no local delete has
    /// happened since. An acknowledged delete removes the tombstone. Returns
    /// the number of records affected.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails; nothing is written then.
    pub async fn acknowledge(&self, ids: &[MessageId], mutation: Mutation) -> Result<u64> {
        let statement = match mutation {
            Mutation::MarkRead => {
                "UPDATE messages SET dirty = 0 WHERE id = ? AND dirty = 1 AND is_deleted = 0"
            }
            Mutation::Delete => "DELETE FROM messages WHERE id = ? AND is_deleted = 1",
        };

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for id in ids {
            affected += sqlx::query(statement)
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        debug!("Store: {} acknowledged for {} record(s)", mutation, affected);
        Ok(affected)
    }

    /// Physically removes the given records, skipping dirty ones.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails; nothing is removed then.
    pub async fn purge_ids(&self, ids: &[MessageId]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for id in ids {
            removed += sqlx::query("DELETE FROM messages WHERE id = ? AND dirty = 0")
                .bind(id.as_str())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed)
    }

    /// Physically removes records expired at `now`, skipping dirty ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM messages
            WHERE expires_at IS NOT NULL AND expires_at <= ? AND dirty = 0
            ",
        )
        .bind(now.timestamp_micros())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Messages for the inbox view, newest first.
    ///
    /// Excludes tombstones and messages expired now.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a record is corrupt.
    pub async fn active_messages(&self) -> Result<Vec<Message>> {
        self.active_messages_at(Utc::now()).await
    }

    /// Messages for the inbox view as of `now`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a record is corrupt.
    pub async fn active_messages_at(&self, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS}
            WHERE is_deleted = 0 AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY created_at DESC, id ASC"
        ))
        .bind(now.timestamp_micros())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Every stored record, including tombstones and expired messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a record is corrupt.
    pub async fn all_messages(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at DESC, id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Records with a local change waiting for acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a record is corrupt.
    pub async fn dirty_messages(&self) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE dirty = 1 ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Looks up one record, tombstoned or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the record is corrupt.
    pub async fn message(&self, id: &MessageId) -> Result<Option<Message>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// IDs of every stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn ids(&self) -> Result<HashSet<MessageId>> {
        let rows = sqlx::query("SELECT id FROM messages")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<MessageId> { Ok(MessageId(row.try_get("id")?)) })
            .collect()
    }

    /// Number of unread messages in the inbox view.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn unread_count(&self) -> Result<u64> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS count FROM messages
            WHERE is_read = 0 AND is_deleted = 0 AND (expires_at IS NULL OR expires_at > ?)
            ",
        )
        .bind(Utc::now().timestamp_micros())
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("count")?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn invalidate_all(&self) -> Result<()> {
        let result = sqlx::query("DELETE FROM messages")
            .execute(&self.pool)
            .await?;
        debug!("Store: invalidated {} record(s)", result.rows_affected());
        Ok(())
    }
}

fn timestamp(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::Corrupt(format!("timestamp out of range: {micros}")))
}

fn row_to_message(row: &SqliteRow) -> Result<Message> {
    let extra_json: String = row.try_get("extra_json")?;
    let expires_at: Option<i64> = row.try_get("expires_at")?;

    Ok(Message {
        id: MessageId(row.try_get("id")?),
        created_at: timestamp(row.try_get("created_at")?)?,
        expires_at: expires_at.map(timestamp).transpose()?,
        is_read: row.try_get("is_read")?,
        is_deleted: row.try_get("is_deleted")?,
        body_ref: row.try_get("body_ref")?,
        title: row.try_get("title")?,
        extra: serde_json::from_str(&extra_json)?,
        dirty: row.try_get("dirty")?,
    })
}
