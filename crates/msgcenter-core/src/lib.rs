//! # msgcenter-core
//!
//! Offline inbox cache and synchronization engine for the message center.
//!
//! This crate provides:
//! - **Inbox Store** - durable `SQLite` cache of message metadata with
//!   tombstones and dirty flags for unacknowledged local changes
//! - **Sync Coordinator** - coalesced fetch/reconcile cycles, optimistic
//!   mark-read and delete, bounded retry
//! - **Identity Binder** - user/channel binding whose changes invalidate the
//!   cache
//! - **Observers** - snapshot, failure and rejection notifications
//!
//! ## Quick Start
//!
//! ```ignore
//! use msgcenter_api::Credentials;
//! use msgcenter_core::{Inbox, InboxConfig, open_pool};
//!
//! #[tokio::main]
//! async fn main() -> msgcenter_core::Result<()> {
//!     let pool = open_pool("msgcenter.db".as_ref()).await?;
//!     let inbox = Inbox::new(InboxConfig::new("https://inbox.example.com/")?, pool).await?;
//!     inbox
//!         .identity()
//!         .set_credentials(Credentials::new("user-id", "password", "channel-id"))
//!         .await?;
//!
//!     match inbox.refresh().await {
//!         Ok(messages) => println!("{} message(s)", messages.len()),
//!         Err(e) => eprintln!("sync failed, showing cached inbox: {e}"),
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod identity;
mod inbox;
pub mod store;
pub mod sync;
#[cfg(test)]
mod testing;

pub use config::{DEFAULT_IDENTITY_TIMEOUT, DEFAULT_SYNC_TIMEOUT, InboxConfig, InboxConfigBuilder};
pub use error::{Error, Result, SyncError};
pub use identity::credentials;
pub use identity::{CredentialError, CredentialResult, IdentityBinder, IdentityState};
pub use inbox::Inbox;
pub use store::{InboxStore, Message, PreferenceStore, open_in_memory, open_pool};
pub use sync::{InboxEvent, InboxObserver, RetryPolicy, SyncCoordinator, SyncMetadata, SyncPhase};
