//! The bound user/channel identity.

use std::time::Duration;

use msgcenter_api::Credentials;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::store::PreferenceStore;
use crate::{Error, Result};

const VERSION_KEY: &str = "msgcenter.identity.version";
const IDENTITY_KEY: &str = "msgcenter.identity.current";

/// Identity as last published by the binder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityState {
    /// Bumped every time a different identity is bound or the binding is cleared.
    pub version: u64,
    /// Current credentials, if signed in.
    pub credentials: Option<Credentials>,
}

/// The non-secret part of a binding, persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct BoundIdentity {
    user_id: String,
    channel_id: String,
}

impl From<&Credentials> for BoundIdentity {
    fn from(credentials: &Credentials) -> Self {
        Self {
            user_id: credentials.user_id.clone(),
            channel_id: credentials.channel_id.clone(),
        }
    }
}

/// Supplies credentials to the sync machinery and announces identity changes.
///
/// An identity is the `(user_id, channel_id)` pair. Replacing only the
/// password keeps the version, so cached messages survive a credential
/// refresh.
#[derive(Debug)]
pub struct IdentityBinder {
    prefs: PreferenceStore,
    bound: Mutex<Option<BoundIdentity>>,
    state: watch::Sender<IdentityState>,
    refresh: watch::Sender<u64>,
}

impl IdentityBinder {
    /// Restores the persisted identity version.
    ///
    /// Credentials are not restored; call [`set_credentials`](Self::set_credentials)
    /// once the secret is available. Rebinding the same identity keeps the
    /// version.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted records cannot be read.
    pub async fn load(prefs: PreferenceStore) -> Result<Self> {
        let version = prefs.get_json::<u64>(VERSION_KEY).await?.unwrap_or_default();
        let bound = prefs.get_json::<BoundIdentity>(IDENTITY_KEY).await?;
        debug!("Identity: restored version {version}");

        Ok(Self {
            prefs,
            bound: Mutex::new(bound),
            state: watch::Sender::new(IdentityState {
                version,
                credentials: None,
            }),
            refresh: watch::Sender::new(0),
        })
    }

    /// Binds `credentials`, returning the resulting identity version.
    ///
    /// # Errors
    ///
    /// Returns an error if the new version cannot be persisted; the previous
    /// binding stays in effect then.
    pub async fn set_credentials(&self, credentials: Credentials) -> Result<u64> {
        let mut bound = self.bound.lock().await;
        let identity = BoundIdentity::from(&credentials);
        let mut version = self.state.borrow().version;

        if bound.as_ref().is_none_or(|current| *current != identity) {
            version += 1;
            self.prefs.set_json(VERSION_KEY, &version).await?;
            self.prefs.set_json(IDENTITY_KEY, &identity).await?;
            info!(
                "Identity: bound user {} on channel {} (version {version})",
                identity.user_id, identity.channel_id
            );
            *bound = Some(identity);
        } else {
            debug!("Identity: credentials refreshed for user {}", identity.user_id);
        }

        self.state.send_replace(IdentityState {
            version,
            credentials: Some(credentials),
        });
        Ok(version)
    }

    /// Forgets the current credentials and bumps the version.
    ///
    /// # Errors
    ///
    /// Returns an error if the new version cannot be persisted.
    pub async fn clear(&self) -> Result<u64> {
        let mut bound = self.bound.lock().await;
        let version = self.state.borrow().version + 1;

        self.prefs.set_json(VERSION_KEY, &version).await?;
        self.prefs.remove(IDENTITY_KEY).await?;
        *bound = None;

        self.state.send_replace(IdentityState {
            version,
            credentials: None,
        });
        info!("Identity: cleared (version {version})");
        Ok(version)
    }

    /// Waits up to `timeout` for credentials to be bound.
    ///
    /// Returns the identity version together with the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentityUnavailable`] if nothing is bound in time.
    pub async fn current_identity(&self, timeout: Duration) -> Result<(u64, Credentials)> {
        let mut rx = self.state.subscribe();
        let wait = async {
            rx.wait_for(|state| state.credentials.is_some())
                .await
                .ok()
                .and_then(|state| Some((state.version, state.credentials.clone()?)))
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Some(identity)) => Ok(identity),
            _ => Err(Error::IdentityUnavailable(timeout)),
        }
    }

    /// The bound `(user_id, channel_id)`, restored across restarts.
    pub async fn bound_identity(&self) -> Option<(String, String)> {
        self.bound
            .lock()
            .await
            .as_ref()
            .map(|b| (b.user_id.clone(), b.channel_id.clone()))
    }

    /// Current identity version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.borrow().version
    }

    /// Current state, credentials included.
    #[must_use]
    pub fn snapshot(&self) -> IdentityState {
        self.state.borrow().clone()
    }

    /// Subscribes to identity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }

    /// Asks whoever owns the credentials to refresh them.
    pub fn request_refresh(&self) {
        self.refresh.send_modify(|count| *count += 1);
        info!("Identity: credential refresh requested");
    }

    /// Receiver that changes every time a refresh is requested.
    #[must_use]
    pub fn refresh_requests(&self) -> watch::Receiver<u64> {
        self.refresh.subscribe()
    }

    /// Number of refreshes requested so far.
    #[must_use]
    pub fn refresh_request_count(&self) -> u64 {
        *self.refresh.borrow()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::open_in_memory;

    fn creds(user: &str, password: &str, channel: &str) -> Credentials {
        Credentials::new(user, password, channel)
    }

    #[tokio::test]
    async fn test_version_bumps_only_on_identity_change() {
        let prefs = PreferenceStore::new(open_in_memory().await.unwrap())
            .await
            .unwrap();
        let binder = IdentityBinder::load(prefs).await.unwrap();
        assert_eq!(binder.version(), 0);

        assert_eq!(binder.set_credentials(creds("u1", "a", "c1")).await.unwrap(), 1);
        // Password rotation is not an identity change.
        assert_eq!(binder.set_credentials(creds("u1", "b", "c1")).await.unwrap(), 1);
        assert_eq!(binder.set_credentials(creds("u1", "b", "c2")).await.unwrap(), 2);
        assert_eq!(binder.set_credentials(creds("u2", "b", "c2")).await.unwrap(), 3);

        let state = binder.snapshot();
        assert_eq!(state.version, 3);
        assert_eq!(state.credentials.unwrap().password, "b");
    }

    #[tokio::test]
    async fn test_version_persists_across_load() {
        let prefs = PreferenceStore::new(open_in_memory().await.unwrap())
            .await
            .unwrap();
        let binder = IdentityBinder::load(prefs.clone()).await.unwrap();
        binder.set_credentials(creds("u1", "a", "c1")).await.unwrap();
        drop(binder);

        let restored = IdentityBinder::load(prefs).await.unwrap();
        assert_eq!(restored.version(), 1);
        assert_eq!(
            restored.bound_identity().await,
            Some(("u1".to_string(), "c1".to_string()))
        );
        assert!(restored.snapshot().credentials.is_none());
        assert_eq!(restored.set_credentials(creds("u1", "a", "c1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear_bumps_version() {
        let prefs = PreferenceStore::new(open_in_memory().await.unwrap())
            .await
            .unwrap();
        let binder = IdentityBinder::load(prefs).await.unwrap();
        binder.set_credentials(creds("u1", "a", "c1")).await.unwrap();

        assert_eq!(binder.clear().await.unwrap(), 2);
        assert!(binder.snapshot().credentials.is_none());
        assert_eq!(binder.bound_identity().await, None);
        // Rebinding the same user after sign-out is a new identity.
        assert_eq!(binder.set_credentials(creds("u1", "a", "c1")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_current_identity_times_out() {
        let prefs = PreferenceStore::new(open_in_memory().await.unwrap())
            .await
            .unwrap();
        let binder = IdentityBinder::load(prefs).await.unwrap();

        let result = binder.current_identity(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::IdentityUnavailable(_))));
    }

    #[tokio::test]
    async fn test_current_identity_waits_for_binding() {
        let prefs = PreferenceStore::new(open_in_memory().await.unwrap())
            .await
            .unwrap();
        let binder = Arc::new(IdentityBinder::load(prefs).await.unwrap());

        let waiter = {
            let binder = Arc::clone(&binder);
            tokio::spawn(async move { binder.current_identity(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        binder.set_credentials(creds("u1", "a", "c1")).await.unwrap();

        let (version, credentials) = waiter.await.unwrap().unwrap();
        assert_eq!(version, 1);
        assert_eq!(credentials.user_id, "u1");
    }

    #[tokio::test]
    async fn test_refresh_requests() {
        let prefs = PreferenceStore::new(open_in_memory().await.unwrap())
            .await
            .unwrap();
        let binder = IdentityBinder::load(prefs).await.unwrap();
        let mut rx = binder.refresh_requests();

        binder.request_refresh();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(binder.refresh_request_count(), 1);
    }
}
