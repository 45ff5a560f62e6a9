//! Password storage using the system keyring.
//!
//! Backed by the platform's native credential storage:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use tracing::{debug, warn};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "msgcenter";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// A user ID is required for credential operations.
    #[error("User ID is required for credential storage")]
    MissingUserId,
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

fn entry(user_id: &str) -> CredentialResult<Entry> {
    if user_id.is_empty() {
        return Err(CredentialError::MissingUserId);
    }
    Ok(Entry::new(SERVICE_NAME, &format!("{SERVICE_NAME}_password_{user_id}"))?)
}

/// Stores the mailbox password for `user_id`.
///
/// # Errors
///
/// Returns an error if `user_id` is empty or the keyring operation fails.
pub fn store_password(user_id: &str, password: &str) -> CredentialResult<()> {
    entry(user_id)?.set_password(password)?;
    debug!("Stored password for user {user_id}");
    Ok(())
}

/// Retrieves the mailbox password for `user_id`.
///
/// # Errors
///
/// Returns an error if `user_id` is empty or the keyring operation fails.
pub fn get_password(user_id: &str) -> CredentialResult<Option<String>> {
    match entry(user_id)?.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => {
            debug!("No password found for user {user_id}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes the mailbox password for `user_id`.
///
/// # Errors
///
/// Returns an error if the keyring operation fails (except for missing entries).
pub fn delete_password(user_id: &str) -> CredentialResult<()> {
    match entry(user_id)?.delete_credential() {
        Ok(()) => {
            debug!("Deleted password for user {user_id}");
            Ok(())
        }
        Err(keyring::Error::NoEntry) => {
            debug!("No password to delete for user {user_id}");
            Ok(())
        }
        Err(e) => {
            warn!("Failed to delete password: {e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    // These touch the real system keyring. Run manually with `cargo test -- --ignored`.

    use super::*;

    #[test]
    fn test_empty_user_id_rejected() {
        assert!(matches!(
            store_password("", "pw"),
            Err(CredentialError::MissingUserId)
        ));
        assert!(matches!(get_password(""), Err(CredentialError::MissingUserId)));
    }

    #[test]
    #[ignore = "Interacts with system keyring"]
    fn test_store_get_delete_password() {
        let user = "msgcenter-test-user-99999";

        store_password(user, "secret").unwrap();
        assert_eq!(get_password(user).unwrap(), Some("secret".to_string()));

        delete_password(user).unwrap();
        assert_eq!(get_password(user).unwrap(), None);
        delete_password(user).unwrap();
    }
}
