//! Persistence for the session: access token, refresh token and the signed-in
//! user's identity.
//!
//! Nothing in the HTTP layer knows which implementation is in use; it only sees
//! `Arc<dyn CredentialStore>`.

use async_trait::async_trait;
use mobank_core::authentication::types::{AccessToken, RefreshToken, TokenPair, UserIdentity};
use thiserror::Error;

mod file;
pub use file::FileCredentialStore;

mod memory;
pub use memory::MemoryCredentialStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Could not resolve the home directory for credential storage")]
    HomeNotFound,
}

/// Reads never fail on missing entries, they return `Ok(None)`. Only genuine
/// storage failures surface as [`StorageError`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_access_token(&self) -> Result<Option<AccessToken>, StorageError>;

    async fn get_refresh_token(&self) -> Result<Option<RefreshToken>, StorageError>;

    /// Writes both tokens in one operation; both are persisted when this returns.
    async fn set_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError>;

    /// Replaces the access token and leaves the refresh token untouched.
    async fn set_access_token(&self, token: &AccessToken) -> Result<(), StorageError>;

    /// Removes both tokens. Succeeds when they are already gone.
    async fn clear_tokens(&self) -> Result<(), StorageError>;

    async fn get_user(&self) -> Result<Option<UserIdentity>, StorageError>;

    async fn set_user(&self, user: &UserIdentity) -> Result<(), StorageError>;

    async fn clear_user(&self) -> Result<(), StorageError>;

    /// Forgets everything about the signed-in user.
    async fn clear_session(&self) -> Result<(), StorageError> {
        self.clear_tokens().await?;
        self.clear_user().await
    }
}
