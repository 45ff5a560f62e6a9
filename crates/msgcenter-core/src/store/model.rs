//! Inbox data models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use msgcenter_api::{MessageId, Mutation, RemoteMessage};
use serde::{Deserialize, Serialize};

/// A cached inbox message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID, unique within the bound user's mailbox.
    pub id: MessageId,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// When the message stops being shown, if ever.
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Deletion tombstone; the record stays until the delete is acknowledged.
    pub is_deleted: bool,
    /// Reference to the full body, fetched lazily elsewhere.
    pub body_ref: String,
    /// Display title.
    pub title: Option<String>,
    /// Opaque key/value data delivered with the message.
    pub extra: BTreeMap<String, String>,
    /// A local change is waiting for server acknowledgment.
    pub dirty: bool,
}

impl Message {
    /// Returns true if the message has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }

    /// Returns true if the message belongs in the inbox view at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_deleted && !self.is_expired(now)
    }

    /// The local change still waiting for acknowledgment, if any.
    ///
    /// A pending delete supersedes a pending read.
    #[must_use]
    pub const fn pending_mutation(&self) -> Option<Mutation> {
        if !self.dirty {
            None
        } else if self.is_deleted {
            Some(Mutation::Delete)
        } else if self.is_read {
            Some(Mutation::MarkRead)
        } else {
            None
        }
    }
}

impl From<RemoteMessage> for Message {
    fn from(remote: RemoteMessage) -> Self {
        Self {
            id: remote.id,
            created_at: remote.created_at,
            expires_at: remote.expires_at,
            is_read: remote.is_read,
            is_deleted: remote.is_deleted,
            body_ref: remote.body_ref,
            title: remote.title,
            extra: remote.extra,
            dirty: false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn message() -> Message {
        Message {
            id: MessageId::from("m1"),
            created_at: Utc::now(),
            expires_at: None,
            is_read: false,
            is_deleted: false,
            body_ref: "https://x/m1".to_string(),
            title: None,
            extra: BTreeMap::new(),
            dirty: false,
        }
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let mut m = message();
        assert!(!m.is_expired(now));

        m.expires_at = Some(now - Duration::seconds(1));
        assert!(m.is_expired(now));
        assert!(!m.is_active(now));

        m.expires_at = Some(now + Duration::hours(1));
        assert!(m.is_active(now));
    }

    #[test]
    fn test_pending_mutation() {
        let mut m = message();
        assert_eq!(m.pending_mutation(), None);

        m.is_read = true;
        assert_eq!(m.pending_mutation(), None);

        m.dirty = true;
        assert_eq!(m.pending_mutation(), Some(Mutation::MarkRead));

        m.is_deleted = true;
        assert_eq!(m.pending_mutation(), Some(Mutation::Delete));
    }
}
