//! User/channel identity binding.
//!
//! Provides the [`IdentityBinder`] consulted before every sync and the
//! keyring helpers used to keep the password out of the database.

mod binder;
pub mod credentials;

pub use binder::{IdentityBinder, IdentityState};
pub use credentials::{CredentialError, CredentialResult};
