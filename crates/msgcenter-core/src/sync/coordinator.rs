//! Fetch, reconcile and mutation orchestration.
//!
//! At most one sync attempt runs at a time. Every [`refresh`](SyncCoordinator::refresh)
//! issued while an attempt is in flight attaches to that attempt's outcome.
//! The attempt itself runs as a detached task, so a caller that gives up
//! waiting never cancels it for the others.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use msgcenter_api::{Credentials, ErrorKind, Listing, MailboxApi, MessageId, Mutation};
use tokio::sync::{Mutex as AsyncMutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::observer::{InboxEvent, InboxObserver, Observers};
use super::state::{SyncMetadata, SyncPhase};
use crate::config::InboxConfig;
use crate::identity::{IdentityBinder, IdentityState};
use crate::store::{InboxStore, Message, PreferenceStore};
use crate::{Result, SyncError};

/// Outcome shared by every caller attached to one attempt.
type SyncOutcome = std::result::Result<Vec<Message>, SyncError>;

/// What the service said about a mutation.
enum Ack {
    /// These IDs were acknowledged (possibly a subset).
    Acknowledged(Vec<MessageId>),
    /// The service refused the mutation permanently.
    Rejected(String),
    /// No answer worth recording; the records stay dirty.
    Pending,
}

/// Keeps the [`InboxStore`] consistent with the remote mailbox.
pub struct SyncCoordinator<A: MailboxApi> {
    inner: Arc<Inner<A>>,
    listener: JoinHandle<()>,
}

struct Inner<A: MailboxApi> {
    api: A,
    store: InboxStore,
    prefs: PreferenceStore,
    identity: Arc<IdentityBinder>,
    config: InboxConfig,
    /// Outcome channel of the attempt in flight, if any.
    in_flight: Mutex<Option<watch::Receiver<Option<SyncOutcome>>>>,
    /// Serializes reconciliation and identity invalidation.
    write_lock: AsyncMutex<()>,
    phase: watch::Sender<SyncPhase>,
    observers: Observers,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: MailboxApi> SyncCoordinator<A> {
    /// Creates a coordinator and starts listening for identity changes.
    ///
    /// If the identity version moved since the cache was last written (for
    /// example while the process was not running), the cache is invalidated
    /// before this returns. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync metadata cannot be read or the cache
    /// cannot be invalidated.
    pub async fn new(
        api: A,
        store: InboxStore,
        prefs: PreferenceStore,
        identity: Arc<IdentityBinder>,
        config: InboxConfig,
    ) -> Result<Self> {
        let inner = Arc::new(Inner {
            api,
            store,
            prefs,
            identity,
            config,
            in_flight: Mutex::new(None),
            write_lock: AsyncMutex::new(()),
            phase: watch::Sender::new(SyncPhase::Idle),
            observers: Observers::new(),
            pending: Mutex::new(Vec::new()),
        });

        // Subscribe first so no change between the check and the spawn is lost.
        let changes = inner.identity.subscribe();
        inner.apply_identity(inner.identity.version()).await?;
        let listener = Inner::spawn_identity_listener(&inner, changes);

        Ok(Self { inner, listener })
    }

    /// Runs a sync attempt, or joins the one already in flight.
    ///
    /// Returns the inbox snapshot after reconciliation.
    ///
    /// # Errors
    ///
    /// Returns the attempt's [`SyncError`]. The cached messages are left
    /// as they were before the attempt.
    pub async fn refresh(&self) -> std::result::Result<Vec<Message>, SyncError> {
        let mut rx = self.inner.submit();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or_else(|| Err(aborted())),
            Err(_) => Err(aborted()),
        };
        outcome
    }

    /// Calls [`refresh`](Self::refresh) until it succeeds or the retry policy
    /// gives up.
    ///
    /// Transient failures back off exponentially. An unauthorized attempt is
    /// retried once, after the credentials have been replaced. Other failures
    /// are returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's [`SyncError`].
    pub async fn refresh_with_retry(&self) -> std::result::Result<Vec<Message>, SyncError> {
        let policy = &self.inner.config.retry;
        let mut identity = self.inner.identity.subscribe();
        let mut reauthorized = false;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            identity.mark_unchanged();
            let error = match self.refresh().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => e,
            };
            if attempt >= policy.max_attempts.max(1) {
                return Err(error);
            }

            match &error {
                SyncError::Unauthorized(_) if !reauthorized => {
                    reauthorized = true;
                    let replaced =
                        timeout(self.inner.config.identity_timeout, identity.changed()).await;
                    if !matches!(replaced, Ok(Ok(()))) {
                        return Err(error);
                    }
                    info!("Sync: credentials replaced, retrying");
                }
                SyncError::Transient(_) => {
                    let delay = policy.delay_for(attempt);
                    info!("Sync: attempt {attempt} failed ({error}), retrying in {delay:?}");
                    sleep(delay).await;
                }
                _ => return Err(error),
            }
        }
    }

    /// Marks `id` read locally and tells the service in the background.
    ///
    /// Returns whether the local state changed. Never waits for a sync in
    /// flight; while its listing is outstanding, the reconciliation that
    /// follows pushes the change.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn request_mark_read(&self, id: &MessageId) -> Result<bool> {
        let changed = self.inner.store.mark_locally_read(id).await?;
        if changed {
            self.dispatch(Mutation::MarkRead, id.clone());
        }
        Ok(changed)
    }

    /// Deletes `id` locally and tells the service in the background.
    ///
    /// Returns whether the local state changed. The record stays as a
    /// tombstone until the service acknowledges the delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn request_delete(&self, id: &MessageId) -> Result<bool> {
        let changed = self.inner.store.mark_locally_deleted(id).await?;
        if changed {
            self.dispatch(Mutation::Delete, id.clone());
        }
        Ok(changed)
    }

    fn dispatch(&self, mutation: Mutation, id: MessageId) {
        // Reconciliation may already have scanned the dirty records, so only
        // an outstanding listing is a safe point to defer to.
        if self.phase() == SyncPhase::Syncing {
            debug!("Sync: {mutation} for {id} deferred to reconciliation");
            return;
        }
        let IdentityState {
            version,
            credentials: Some(credentials),
        } = self.inner.identity.snapshot()
        else {
            debug!("Sync: {mutation} for {id} deferred, no identity bound");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let ids = [id];
            let ack = inner.send_mutation(&credentials, mutation, &ids).await;
            let _guard = inner.write_lock.lock().await;
            if let Err(e) = inner.record_mutation(version, mutation, &ids, ack).await {
                warn!("Sync: failed to record {mutation} acknowledgment: {e}");
            }
        });

        let mut pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pending.retain(|task| !task.is_finished());
        pending.push(handle);
    }

    /// Waits for every background mutation started so far.
    pub async fn flush_pending(&self) {
        let tasks = std::mem::take(
            &mut *self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Sync: mutation task failed: {e}");
            }
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        *self.inner.phase.borrow()
    }

    /// Subscribes to phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.inner.phase.subscribe()
    }

    /// Registers an observer.
    pub fn add_observer(&self, observer: Arc<dyn InboxObserver>) {
        self.inner.observers.add(observer);
    }

    /// Subscribes to inbox events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InboxEvent> {
        self.inner.observers.subscribe()
    }

    /// The store this coordinator writes to.
    pub(crate) fn store(&self) -> &InboxStore {
        &self.inner.store
    }

    /// Unbinds the identity and invalidates the cache before returning.
    ///
    /// Returns the new identity version.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity or the cache cannot be written.
    pub async fn sign_out(&self) -> Result<u64> {
        let version = self.inner.identity.clear().await?;
        self.inner.apply_identity(version).await?;
        Ok(version)
    }

    /// The identity binder this coordinator follows.
    #[must_use]
    pub fn identity(&self) -> &Arc<IdentityBinder> {
        &self.inner.identity
    }

    /// Persisted metadata of the last successful sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub async fn metadata(&self) -> Result<SyncMetadata> {
        SyncMetadata::load(&self.inner.prefs).await
    }
}

impl<A: MailboxApi> Drop for SyncCoordinator<A> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl<A: MailboxApi> std::fmt::Debug for SyncCoordinator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("phase", &self.phase())
            .field("observers", &self.inner.observers)
            .finish_non_exhaustive()
    }
}

fn aborted() -> SyncError {
    SyncError::Transient("sync attempt aborted".to_string())
}

impl<A: MailboxApi> Inner<A> {
    fn spawn_identity_listener(
        this: &Arc<Self>,
        mut changes: watch::Receiver<IdentityState>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(this);
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let version = changes.borrow_and_update().version;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = inner.apply_identity(version).await {
                    warn!("Sync: failed to apply identity version {version}: {e}");
                }
            }
        })
    }

    /// Returns the outcome channel of the attempt in flight, starting one if
    /// there is none.
    fn submit(self: &Arc<Self>) -> watch::Receiver<Option<SyncOutcome>> {
        let mut slot = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // A closed channel means the attempt died without an outcome.
        if let Some(rx) = slot.as_ref().filter(|rx| rx.has_changed().is_ok()) {
            debug!("Sync: joining attempt in flight");
            return rx.clone();
        }

        let (tx, rx) = watch::channel(None);
        *slot = Some(rx.clone());
        self.phase.send_replace(SyncPhase::Syncing);

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner.run_sync().await;
            inner.finish(&tx, outcome);
        });
        rx
    }

    fn finish(&self, tx: &watch::Sender<Option<SyncOutcome>>, outcome: SyncOutcome) {
        match &outcome {
            Ok(snapshot) => {
                info!("Sync: complete, {} active message(s)", snapshot.len());
                self.phase.send_replace(SyncPhase::Idle);
                self.observers.updated(snapshot);
            }
            Err(e) => {
                warn!("Sync: failed: {e}");
                self.phase.send_replace(SyncPhase::Failed);
                self.observers.failed(e);
            }
        }

        let mut slot = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        tx.send_replace(Some(outcome));
    }

    async fn run_sync(&self) -> SyncOutcome {
        let (version, credentials) = self
            .identity
            .current_identity(self.config.identity_timeout)
            .await?;
        self.apply_identity(version).await?;

        let metadata = SyncMetadata::load(&self.prefs).await?;
        let since = metadata.last_sync_token.as_deref();
        debug!("Sync: listing (identity version {version}, since={since:?})");

        let listing = match timeout(
            self.config.sync_timeout,
            self.api.list_messages(&credentials, since),
        )
        .await
        {
            Ok(Ok(listing)) => listing,
            Ok(Err(e)) => {
                let error = SyncError::from_api(&e);
                if matches!(error, SyncError::Unauthorized(_)) {
                    self.identity.request_refresh();
                }
                return Err(error);
            }
            Err(_) => {
                return Err(SyncError::Transient(format!(
                    "listing timed out after {:?}",
                    self.config.sync_timeout
                )));
            }
        };

        self.phase.send_replace(SyncPhase::Reconciling);
        self.reconcile(version, &credentials, listing).await
    }

    /// Applies `listing` to the store and pushes pending mutations.
    async fn reconcile(
        &self,
        version: u64,
        credentials: &Credentials,
        listing: Listing,
    ) -> std::result::Result<Vec<Message>, SyncError> {
        let _guard = self.write_lock.lock().await;
        if self.identity.version() != version {
            info!("Sync: identity changed during sync, discarding listing");
            return Err(SyncError::IdentityChanged);
        }

        let fetched: Vec<Message> = listing.messages.into_iter().map(Message::from).collect();
        self.store.upsert(&fetched).await?;

        if listing.full {
            let fetched_ids: HashSet<&MessageId> = fetched.iter().map(|m| &m.id).collect();
            let stale: Vec<MessageId> = self
                .store
                .ids()
                .await?
                .into_iter()
                .filter(|id| !fetched_ids.contains(id))
                .collect();
            if !stale.is_empty() {
                let purged = self.store.purge_ids(&stale).await?;
                debug!("Sync: purged {purged} of {} stale record(s)", stale.len());
            }
        }

        let now = Utc::now();
        self.store.purge_expired(now).await?;

        let mut deletes = Vec::new();
        let mut reads = Vec::new();
        for message in self.store.dirty_messages().await? {
            match message.pending_mutation() {
                Some(Mutation::Delete) => deletes.push(message.id),
                Some(Mutation::MarkRead) => reads.push(message.id),
                None => {}
            }
        }
        for (mutation, ids) in [(Mutation::Delete, deletes), (Mutation::MarkRead, reads)] {
            if !ids.is_empty() {
                debug!("Sync: re-issuing {mutation} for {} message(s)", ids.len());
                let ack = self.send_mutation(credentials, mutation, &ids).await;
                if matches!(ack, Ack::Rejected(_)) && ids.len() > 1 {
                    // One refused ID fails the whole request; find which.
                    debug!("Sync: {mutation} batch rejected, retrying one at a time");
                    for id in &ids {
                        let single = std::slice::from_ref(id);
                        let ack = self.send_mutation(credentials, mutation, single).await;
                        self.record_mutation(version, mutation, single, ack).await?;
                    }
                } else {
                    self.record_mutation(version, mutation, &ids, ack).await?;
                }
            }
        }

        SyncMetadata {
            last_sync_token: listing.next_token,
            last_sync_timestamp: Some(now),
            identity_version: version,
        }
        .save(&self.prefs)
        .await?;

        Ok(self.store.active_messages_at(now).await?)
    }

    /// Invalidates the cache if `version` is newer than the one it belongs to.
    async fn apply_identity(&self, version: u64) -> Result<bool> {
        let guard = self.write_lock.lock().await;
        let metadata = SyncMetadata::load(&self.prefs).await?;
        if metadata.identity_version >= version {
            return Ok(false);
        }

        self.store.invalidate_all().await?;
        SyncMetadata::reset(version).save(&self.prefs).await?;
        drop(guard);

        info!(
            "Sync: identity version {} -> {version}, cache invalidated",
            metadata.identity_version
        );
        self.observers.updated(&[]);
        Ok(true)
    }

    /// Sends one mutation; never fails, the outcome is classified instead.
    async fn send_mutation(
        &self,
        credentials: &Credentials,
        mutation: Mutation,
        ids: &[MessageId],
    ) -> Ack {
        let call = self.api.apply(credentials, mutation, ids);
        match timeout(self.config.sync_timeout, call).await {
            Ok(Ok(acknowledged)) => Ack::Acknowledged(acknowledged),
            Ok(Err(e)) => match e.kind() {
                ErrorKind::Rejected => Ack::Rejected(e.to_string()),
                ErrorKind::Unauthorized => {
                    warn!("Sync: {mutation} unauthorized, will retry after refresh");
                    self.identity.request_refresh();
                    Ack::Pending
                }
                ErrorKind::Transient => {
                    warn!("Sync: {mutation} failed, will retry: {e}");
                    Ack::Pending
                }
            },
            Err(_) => {
                warn!("Sync: {mutation} timed out, will retry");
                Ack::Pending
            }
        }
    }

    /// Records a mutation outcome. The caller holds the write lock.
    async fn record_mutation(
        &self,
        version: u64,
        mutation: Mutation,
        ids: &[MessageId],
        ack: Ack,
    ) -> Result<()> {
        if self.identity.version() != version {
            debug!("Sync: dropping {mutation} outcome for a previous identity");
            return Ok(());
        }

        match ack {
            Ack::Acknowledged(acknowledged) => {
                let affected = self.store.acknowledge(&acknowledged, mutation).await?;
                debug!(
                    "Sync: {mutation} acknowledged for {} of {} message(s), {affected} updated",
                    acknowledged.len(),
                    ids.len()
                );
            }
            Ack::Rejected(reason) => {
                let cleared = self.store.reject(ids, mutation).await?;
                warn!(
                    "Sync: {mutation} rejected for {} message(s), {cleared} dropped: {reason}",
                    ids.len()
                );
                self.observers.rejected(ids, &reason);
            }
            Ack::Pending => {}
        }
        Ok(())
    }
}
