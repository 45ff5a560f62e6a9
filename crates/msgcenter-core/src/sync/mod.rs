//! Inbox synchronization.
//!
//! The [`SyncCoordinator`] runs fetch/reconcile cycles against a
//! [`MailboxApi`](msgcenter_api::MailboxApi), pushes local mutations and
//! reports changes to [`InboxObserver`]s.

mod coordinator;
mod observer;
mod retry;
mod state;

pub use coordinator::SyncCoordinator;
pub use observer::{InboxEvent, InboxObserver};
pub use retry::RetryPolicy;
pub use state::{SyncMetadata, SyncPhase};
