use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use mobank_core::authentication::types::{AccessToken, RefreshToken, TokenPair, UserIdentity};
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::debug;

use super::{CredentialStore, StorageError};

/// Overrides the directory sessions are stored in (default `~/.mobank`).
pub const MOBANK_HOME_ENV: &str = "MOBANK_HOME";

const STORAGE_DIR: &str = ".mobank";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<AccessToken>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<RefreshToken>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserIdentity>,
}

impl StoredSession {
    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }
}

/// Keeps one JSON document per profile, readable only by the owner on Unix.
///
/// Every mutation is a load-modify-write of the whole document under a lock,
/// and the write goes through a temp file plus rename so a crash never leaves
/// half a token pair on disk.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// `<storage dir>/<profile>.json`, where the storage dir is `$MOBANK_HOME`
    /// or `~/.mobank`.
    pub fn for_profile(profile_name: &str) -> Result<Self, StorageError> {
        Ok(Self::new(storage_dir()?.join(format!("{}.json", profile_name))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoredSession, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(StoredSession::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(StoredSession::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, session: &StoredSession) -> Result<(), StorageError> {
        if session.is_empty() {
            return match fs::remove_file(&self.path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_vec_pretty(session)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp_path).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await?;
        debug!("Persisted session to {}", self.path.display());
        Ok(())
    }

    async fn update<F>(&self, mutate: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut StoredSession) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut session = self.load().await?;
        mutate(&mut session);
        self.save(&session).await
    }

    async fn read(&self) -> Result<StoredSession, StorageError> {
        let _guard = self.lock.lock().await;
        self.load().await
    }
}

fn storage_dir() -> Result<PathBuf, StorageError> {
    if let Ok(dir) = std::env::var(MOBANK_HOME_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home_dir = dirs::home_dir().ok_or(StorageError::HomeNotFound)?;
    Ok(home_dir.join(STORAGE_DIR))
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get_access_token(&self) -> Result<Option<AccessToken>, StorageError> {
        Ok(self.read().await?.access_token)
    }

    async fn get_refresh_token(&self) -> Result<Option<RefreshToken>, StorageError> {
        Ok(self.read().await?.refresh_token)
    }

    async fn set_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        self.update(|session| {
            session.access_token = Some(tokens.access_token.clone());
            session.refresh_token = Some(tokens.refresh_token.clone());
        })
        .await
    }

    async fn set_access_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        self.update(|session| session.access_token = Some(token.clone())).await
    }

    async fn clear_tokens(&self) -> Result<(), StorageError> {
        self.update(|session| {
            session.access_token = None;
            session.refresh_token = None;
        })
        .await
    }

    async fn get_user(&self) -> Result<Option<UserIdentity>, StorageError> {
        Ok(self.read().await?.user)
    }

    async fn set_user(&self, user: &UserIdentity) -> Result<(), StorageError> {
        self.update(|session| session.user = Some(user.clone())).await
    }

    async fn clear_user(&self) -> Result<(), StorageError> {
        self.update(|session| session.user = None).await
    }
}
