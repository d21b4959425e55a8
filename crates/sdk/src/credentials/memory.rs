use async_trait::async_trait;
use mobank_core::authentication::types::{AccessToken, RefreshToken, TokenPair, UserIdentity};
use tokio::sync::RwLock;

use super::{CredentialStore, StorageError};

#[derive(Debug, Default)]
struct Entries {
    access_token: Option<AccessToken>,
    refresh_token: Option<RefreshToken>,
    user: Option<UserIdentity>,
}

/// Process-local store. Used by tests and by embedders that persist the
/// session themselves.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<Entries>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out signed in.
    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            entries: RwLock::new(Entries {
                access_token: Some(tokens.access_token),
                refresh_token: Some(tokens.refresh_token),
                user: None,
            }),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_access_token(&self) -> Result<Option<AccessToken>, StorageError> {
        Ok(self.entries.read().await.access_token.clone())
    }

    async fn get_refresh_token(&self) -> Result<Option<RefreshToken>, StorageError> {
        Ok(self.entries.read().await.refresh_token.clone())
    }

    async fn set_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.access_token = Some(tokens.access_token.clone());
        entries.refresh_token = Some(tokens.refresh_token.clone());
        Ok(())
    }

    async fn set_access_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        self.entries.write().await.access_token = Some(token.clone());
        Ok(())
    }

    async fn clear_tokens(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.access_token = None;
        entries.refresh_token = None;
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<UserIdentity>, StorageError> {
        Ok(self.entries.read().await.user.clone())
    }

    async fn set_user(&self, user: &UserIdentity) -> Result<(), StorageError> {
        self.entries.write().await.user = Some(user.clone());
        Ok(())
    }

    async fn clear_user(&self) -> Result<(), StorageError> {
        self.entries.write().await.user = None;
        Ok(())
    }
}
