//! Wire types for the mailbox service.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque message identifier, unique within a user's mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Creates a message ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Credentials for one user/channel identity.
///
/// Supplied to every API call; the client never caches them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Mailbox user ID.
    pub user_id: String,
    /// Mailbox user password.
    pub password: String,
    /// Device channel the user is bound to.
    pub channel_id: String,
}

impl Credentials {
    /// Creates a credential set.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        password: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
            channel_id: channel_id.into(),
        }
    }

    /// Returns true if both credential sets name the same user on the same channel.
    ///
    /// A password change alone is a credential refresh, not a new identity.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.channel_id == other.channel_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

/// A message as reported by the mailbox service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessage {
    /// Message ID.
    pub id: MessageId,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// When the message stops being shown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the server considers the message read.
    #[serde(default)]
    pub is_read: bool,
    /// Whether the server considers the message deleted.
    #[serde(default)]
    pub is_deleted: bool,
    /// Reference to the full message body.
    pub body_ref: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Opaque key/value data attached to the message.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

/// Result of a list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Messages returned by the service.
    pub messages: Vec<RemoteMessage>,
    /// Token to pass as `since` on the next call, if the service supports it.
    pub next_token: Option<String>,
    /// True if `messages` is the complete mailbox; false if it only holds deltas.
    pub full: bool,
}

impl Listing {
    /// Creates a complete listing.
    #[must_use]
    pub const fn full(messages: Vec<RemoteMessage>, next_token: Option<String>) -> Self {
        Self {
            messages,
            next_token,
            full: true,
        }
    }

    /// Creates a delta listing.
    #[must_use]
    pub const fn incremental(messages: Vec<RemoteMessage>, next_token: Option<String>) -> Self {
        Self {
            messages,
            next_token,
            full: false,
        }
    }
}

/// A user-initiated change that has to be confirmed by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    /// Mark as read.
    MarkRead,
    /// Delete.
    Delete,
}

impl Mutation {
    /// Path segment of the endpoint that applies this mutation.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::MarkRead => "mark-read",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Body of `GET .../messages/`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse {
    #[serde(default)]
    pub messages: Vec<RemoteMessage>,
    #[serde(default)]
    pub next_token: Option<String>,
    /// Services without delta support omit this; treat as a full listing.
    #[serde(default = "default_full")]
    pub full: bool,
}

const fn default_full() -> bool {
    true
}

/// Body of the mutation endpoints.
#[derive(Debug, Serialize)]
pub(crate) struct MutationRequest<'a> {
    pub ids: &'a [MessageId],
}

/// Response of the mutation endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct AckResponse {
    #[serde(default)]
    pub acknowledged: Option<Vec<MessageId>>,
}
