//! Sync phase and persisted sync metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::store::PreferenceStore;

const METADATA_KEY: &str = "msgcenter.sync_metadata";

/// Where the coordinator is in its cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// No attempt in flight.
    #[default]
    Idle,
    /// Waiting on the remote listing.
    Syncing,
    /// Applying a listing to the store.
    Reconciling,
    /// The last attempt failed; the cache holds the last good state.
    Failed,
}

impl SyncPhase {
    /// Returns true while an attempt is in flight.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Syncing | Self::Reconciling)
    }
}

/// Durable record of the last successful sync for the bound identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Token for the next incremental listing; `None` forces a full listing.
    pub last_sync_token: Option<String>,
    /// When the last sync completed.
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    /// Identity version the cache belongs to.
    pub identity_version: u64,
}

impl SyncMetadata {
    /// Loads the stored metadata, or the default if none was saved yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read or decoded.
    pub async fn load(prefs: &PreferenceStore) -> Result<Self> {
        Ok(prefs.get_json(METADATA_KEY).await?.unwrap_or_default())
    }

    /// Persists this metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    pub async fn save(&self, prefs: &PreferenceStore) -> Result<()> {
        prefs.set_json(METADATA_KEY, self).await
    }

    /// Fresh metadata for `identity_version`, forcing a full listing.
    #[must_use]
    pub const fn reset(identity_version: u64) -> Self {
        Self {
            last_sync_token: None,
            last_sync_timestamp: None,
            identity_version,
        }
    }
}
