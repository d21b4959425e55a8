//! Shared harness for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mobank::{
    AccessToken, Client, ClientConfig, CredentialStore, MemoryCredentialStore, RefreshPolicy,
    RefreshToken, StorageError, TokenPair, UserIdentity,
};
use serde_json::{Value, json};
use wiremock::MockServer;

pub fn envelope_ok(body: Value) -> Value {
    json!({ "responseSuccessful": true, "responseMessage": "Success", "responseBody": body })
}

pub fn envelope_fail(message: &str) -> Value {
    json!({ "responseSuccessful": false, "responseMessage": message, "responseBody": null })
}

/// Memory store that writes an entry to a shared log on every mutation, so
/// tests can check what happened before the sign-in redirect.
pub struct RecordingStore {
    inner: MemoryCredentialStore,
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingStore {
    fn record(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn get_access_token(&self) -> Result<Option<AccessToken>, StorageError> {
        self.inner.get_access_token().await
    }

    async fn get_refresh_token(&self) -> Result<Option<RefreshToken>, StorageError> {
        self.inner.get_refresh_token().await
    }

    async fn set_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        self.inner.set_tokens(tokens).await?;
        self.record("set_tokens");
        Ok(())
    }

    async fn set_access_token(&self, token: &AccessToken) -> Result<(), StorageError> {
        self.inner.set_access_token(token).await?;
        self.record("set_access_token");
        Ok(())
    }

    async fn clear_tokens(&self) -> Result<(), StorageError> {
        self.inner.clear_tokens().await?;
        self.record("clear_tokens");
        Ok(())
    }

    async fn get_user(&self) -> Result<Option<UserIdentity>, StorageError> {
        self.inner.get_user().await
    }

    async fn set_user(&self, user: &UserIdentity) -> Result<(), StorageError> {
        self.inner.set_user(user).await?;
        self.record("set_user");
        Ok(())
    }

    async fn clear_user(&self) -> Result<(), StorageError> {
        self.inner.clear_user().await?;
        self.record("clear_user");
        Ok(())
    }
}

pub struct Harness {
    pub server: MockServer,
    pub client: Client,
    pub store: Arc<RecordingStore>,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    pub async fn start(tokens: Option<TokenPair>) -> Self {
        Self::start_with_policy(tokens, RefreshPolicy::default()).await
    }

    pub async fn start_with_policy(tokens: Option<TokenPair>, policy: RefreshPolicy) -> Self {
        Self::start_configured(tokens, |config| config.with_refresh_policy(policy)).await
    }

    pub async fn start_configured<F>(tokens: Option<TokenPair>, configure: F) -> Self
    where
        F: FnOnce(ClientConfig) -> ClientConfig,
    {
        let server = MockServer::start().await;
        let config = configure(ClientConfig::new(server.uri()));
        Self::with_config(server, config, tokens)
    }

    /// Harness whose traffic goes to a closed port instead of the mock server.
    pub async fn unreachable(tokens: Option<TokenPair>) -> Self {
        let server = MockServer::start().await;
        Self::with_config(server, ClientConfig::new("http://127.0.0.1:9"), tokens)
    }

    fn with_config(server: MockServer, config: ClientConfig, tokens: Option<TokenPair>) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let inner = match tokens {
            Some(tokens) => MemoryCredentialStore::with_tokens(tokens),
            None => MemoryCredentialStore::new(),
        };
        let store = Arc::new(RecordingStore { inner, events: Arc::clone(&events) });

        let redirect_events = Arc::clone(&events);
        let client = Client::new(
            config,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::new(move || redirect_events.lock().unwrap().push("redirect".to_string())),
        )
        .expect("build client");

        Self { server, client, store, events }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn redirect_count(&self) -> usize {
        self.events().iter().filter(|event| *event == "redirect").count()
    }

    /// `Authorization` headers of every request the server saw on `path`, in order.
    pub async fn authorization_headers(&self, path: &str) -> Vec<Option<String>> {
        self.server
            .received_requests()
            .await
            .expect("request recording enabled")
            .iter()
            .filter(|request| request.url.path() == path)
            .map(|request| {
                request
                    .headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }
}
