//! The inbox facade.

use std::sync::Arc;

use msgcenter_api::{HttpMailboxApi, MailboxApi, MessageId};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, watch};

use crate::config::InboxConfig;
use crate::identity::IdentityBinder;
use crate::store::{InboxStore, Message, PreferenceStore};
use crate::sync::{InboxEvent, InboxObserver, SyncCoordinator, SyncMetadata, SyncPhase};
use crate::{Result, SyncError};

/// A locally cached, remotely synchronized message inbox.
///
/// Reads are always served from the local cache, so the last good snapshot
/// stays available while syncs fail.
#[derive(Debug)]
pub struct Inbox<A: MailboxApi = HttpMailboxApi> {
    coordinator: SyncCoordinator<A>,
}

impl Inbox<HttpMailboxApi> {
    /// Opens the inbox on `pool`, talking HTTP to `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the database
    /// cannot be prepared.
    pub async fn new(config: InboxConfig, pool: SqlitePool) -> Result<Self> {
        let api = HttpMailboxApi::new(config.api_config())?;
        Self::with_api(config, pool, api).await
    }
}

impl<A: MailboxApi> Inbox<A> {
    /// Opens the inbox on `pool` with a custom mailbox implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be prepared.
    pub async fn with_api(config: InboxConfig, pool: SqlitePool, api: A) -> Result<Self> {
        let prefs = PreferenceStore::new(pool.clone()).await?;
        let store = InboxStore::new(pool).await?;
        let identity = Arc::new(IdentityBinder::load(prefs.clone()).await?);
        let coordinator = SyncCoordinator::new(api, store, prefs, identity, config).await?;
        Ok(Self { coordinator })
    }

    /// Syncs with the service, joining any sync already in flight.
    ///
    /// # Errors
    ///
    /// Returns why the sync failed; the cache is unchanged then.
    pub async fn refresh(&self) -> std::result::Result<Vec<Message>, SyncError> {
        self.coordinator.refresh().await
    }

    /// Syncs with the service, retrying per the configured policy.
    ///
    /// # Errors
    ///
    /// Returns why the last attempt failed.
    pub async fn refresh_with_retry(&self) -> std::result::Result<Vec<Message>, SyncError> {
        self.coordinator.refresh_with_retry().await
    }

    /// Current inbox view, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn messages(&self) -> Result<Vec<Message>> {
        self.coordinator.store().active_messages().await
    }

    /// Every cached record, tombstones and expired messages included.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn all_messages(&self) -> Result<Vec<Message>> {
        self.coordinator.store().all_messages().await
    }

    /// Looks up one message in the inbox view.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn message(&self, id: &MessageId) -> Result<Option<Message>> {
        let message = self.coordinator.store().message(id).await?;
        Ok(message.filter(|m| m.is_active(chrono::Utc::now())))
    }

    /// Number of unread messages in the inbox view.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn unread_count(&self) -> Result<u64> {
        self.coordinator.store().unread_count().await
    }

    /// Marks a message read; returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn mark_read(&self, id: &MessageId) -> Result<bool> {
        self.coordinator.request_mark_read(id).await
    }

    /// Deletes a message; returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn delete(&self, id: &MessageId) -> Result<bool> {
        self.coordinator.request_delete(id).await
    }

    /// Registers an observer.
    pub fn add_observer(&self, observer: Arc<dyn InboxObserver>) {
        self.coordinator.add_observer(observer);
    }

    /// Subscribes to inbox events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InboxEvent> {
        self.coordinator.subscribe()
    }

    /// Forgets the bound identity and empties the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity or the cache cannot be written.
    pub async fn sign_out(&self) -> Result<()> {
        self.coordinator.sign_out().await.map(drop)
    }

    /// The identity binder; bind credentials here before syncing.
    #[must_use]
    pub fn identity(&self) -> &Arc<IdentityBinder> {
        self.coordinator.identity()
    }

    /// Current sync phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.coordinator.phase()
    }

    /// Subscribes to sync phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.coordinator.subscribe_phase()
    }

    /// Metadata of the last successful sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub async fn metadata(&self) -> Result<SyncMetadata> {
        self.coordinator.metadata().await
    }

    /// Waits for background mutation calls to finish.
    pub async fn flush_pending(&self) {
        self.coordinator.flush_pending().await;
    }
}
