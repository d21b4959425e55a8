//! Single-flight access token refresh.
//!
//! However many requests hit a 401 at the same time, only one
//! `POST auth/refresh` is outstanding. The coordinator keeps the in-flight
//! refresh in a one-slot cell; a 401 handler either joins the future already in
//! the slot or installs a new one, and that check-and-set happens under a
//! synchronous lock with no `.await` in between.
//!
//! Store writes are fenced by a session generation. Signing in or out bumps
//! it, and a refresh that read its refresh token under an older generation
//! drops its result instead of writing a token or clearing the new session.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use mobank_core::authentication::types::{AccessToken, RefreshToken};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    RefreshPolicy,
    api::{
        http::HttpTransport,
        types::{ApiError, ApiErrorKind, ApiRequest},
    },
    credentials::CredentialStore,
    redirect::SignInRedirect,
};

pub const REFRESH_ENDPOINT: &str = "auth/refresh";

/// Why a refresh did not produce a new access token. Every waiter on the same
/// refresh receives a clone of the same value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    #[error("No refresh token is stored")]
    MissingRefreshToken,

    #[error("Refresh rejected by server (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Refresh got no response from server: {0}")]
    Network(String),

    #[error("Refreshed access token could not be stored: {0}")]
    Storage(String),

    #[error("Session changed while the refresh was in flight")]
    Superseded,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: AccessToken,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken, RefreshFailure>>>;

/// Current session generation. Held while the stored session is written.
type SessionGate = Arc<AsyncMutex<u64>>;

struct InFlight {
    generation: u64,
    future: RefreshFuture,
}

#[derive(Default)]
struct Slot {
    in_flight: Option<InFlight>,
    next_generation: u64,
    /// Successful refreshes since the coordinator was created.
    completed: u64,
    /// Token minted by the last successful refresh, until reset or a failure.
    latest: Option<AccessToken>,
}

impl Slot {
    /// Empties the slot if it still holds `generation`. Later waiters of the
    /// same refresh find it already settled and leave it alone.
    fn settle(&mut self, generation: u64, result: &Result<AccessToken, RefreshFailure>) {
        if !self.in_flight.as_ref().is_some_and(|in_flight| in_flight.generation == generation) {
            return;
        }
        self.in_flight = None;
        match result {
            Ok(token) => {
                self.completed += 1;
                self.latest = Some(token.clone());
            }
            Err(_) => self.latest = None,
        }
    }
}

enum Ticket {
    /// A refresh finished after the request was dispatched; reuse its token.
    Ready(AccessToken),
    Wait { generation: u64, future: RefreshFuture },
}

pub struct RefreshCoordinator {
    transport: HttpTransport,
    store: Arc<dyn CredentialStore>,
    redirect: Arc<dyn SignInRedirect>,
    policy: RefreshPolicy,
    slot: Mutex<Slot>,
    session: SessionGate,
}

impl RefreshCoordinator {
    /// `transport` must be a transport that is not wrapped by the auth
    /// pipeline, otherwise a 401 from the refresh call would recurse.
    pub fn new(
        transport: HttpTransport,
        store: Arc<dyn CredentialStore>,
        redirect: Arc<dyn SignInRedirect>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            transport,
            store,
            redirect,
            policy,
            slot: Mutex::new(Slot::default()),
            session: Arc::new(AsyncMutex::new(0)),
        }
    }

    /// Counter of successful refreshes. Requests record it at dispatch so a 401
    /// that arrives after someone else already refreshed can reuse that token.
    pub fn epoch(&self) -> u64 {
        self.slot.lock().completed
    }

    pub fn is_refreshing(&self) -> bool {
        self.slot.lock().in_flight.is_some()
    }

    /// Joins the in-flight refresh or starts one.
    pub async fn refresh(&self) -> Result<AccessToken, RefreshFailure> {
        self.refresh_after(None).await
    }

    /// Like [`refresh`](Self::refresh), but when a refresh has completed since
    /// `dispatched_at` its token is returned without another server call.
    pub async fn refresh_after(
        &self,
        dispatched_at: Option<u64>,
    ) -> Result<AccessToken, RefreshFailure> {
        match self.join_or_start(dispatched_at) {
            Ticket::Ready(token) => Ok(token),
            Ticket::Wait { generation, future } => {
                let result = future.await;
                self.slot.lock().settle(generation, &result);
                result
            }
        }
    }

    /// True when `failure` leaves the stored credentials in place.
    pub fn keeps_session_on(&self, failure: &RefreshFailure) -> bool {
        !signs_out(&self.policy, failure)
    }

    /// The error a caller sees when its request could not be recovered.
    /// `raw_body` is the body of the 401 that triggered the refresh.
    pub fn failure_to_error(
        &self,
        failure: RefreshFailure,
        raw_body: Option<serde_json::Value>,
    ) -> ApiError {
        match failure {
            // Session kept by policy; report it as the connectivity problem it is.
            RefreshFailure::Network(_) if !self.policy.sign_out_on_network_error => {
                ApiError::network()
            }
            failure => ApiError::session_expired(failure, raw_body),
        }
    }

    /// Starts a new session generation and forgets any in-flight refresh and
    /// the last minted token. Refreshes started earlier write nothing once
    /// they finish. Write the new session to the store while holding the
    /// returned guard; refreshes wait for it before reading or writing.
    pub(crate) async fn begin_session(&self) -> AsyncMutexGuard<'_, u64> {
        let mut session = self.session.lock().await;
        *session += 1;

        let mut slot = self.slot.lock();
        slot.in_flight = None;
        slot.latest = None;
        drop(slot);

        debug!("Session generation {}", *session);
        session
    }

    /// [`begin_session`](Self::begin_session) without writing anything.
    pub async fn reset(&self) {
        drop(self.begin_session().await);
    }

    fn join_or_start(&self, dispatched_at: Option<u64>) -> Ticket {
        let mut slot = self.slot.lock();

        let settled = match &slot.in_flight {
            Some(in_flight) => match in_flight.future.peek() {
                None => {
                    debug!("Joining in-flight token refresh");
                    return Ticket::Wait {
                        generation: in_flight.generation,
                        future: in_flight.future.clone(),
                    };
                }
                Some(result) => Some((in_flight.generation, result.clone())),
            },
            None => None,
        };
        // Finished, but every waiter went away before settling it.
        if let Some((generation, result)) = settled {
            slot.settle(generation, &result);
        }

        if let (Some(dispatched_at), Some(latest)) = (dispatched_at, &slot.latest) {
            if slot.completed > dispatched_at {
                debug!("Access token was refreshed after dispatch, reusing it");
                return Ticket::Ready(latest.clone());
            }
        }

        slot.next_generation += 1;
        let generation = slot.next_generation;
        let future = run_refresh(
            self.transport.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.redirect),
            self.policy,
            Arc::clone(&self.session),
        )
        .boxed()
        .shared();

        debug!("Starting token refresh #{}", generation);
        slot.in_flight = Some(InFlight { generation, future: future.clone() });
        Ticket::Wait { generation, future }
    }
}

async fn run_refresh(
    transport: HttpTransport,
    store: Arc<dyn CredentialStore>,
    redirect: Arc<dyn SignInRedirect>,
    policy: RefreshPolicy,
    session: SessionGate,
) -> Result<AccessToken, RefreshFailure> {
    let (generation, refresh_token) = {
        let current = session.lock().await;
        (*current, read_refresh_token(store.as_ref()).await)
    };

    let minted = match refresh_token {
        Ok(refresh_token) => request_new_access_token(&transport, &refresh_token).await,
        Err(failure) => Err(failure),
    };

    // Held until the store write or sign-out is done.
    let current = session.lock().await;
    if *current != generation {
        log_failure(&RefreshFailure::Superseded);
        return Err(RefreshFailure::Superseded);
    }

    let result = match minted {
        Ok(token) => match store.set_access_token(&token).await {
            Ok(()) => Ok(token),
            Err(e) => Err(RefreshFailure::Storage(e.to_string())),
        },
        Err(failure) => Err(failure),
    };

    match &result {
        Ok(_) => info!("Access token refreshed"),
        Err(failure) => {
            log_failure(failure);
            if signs_out(&policy, failure) {
                end_session(store.as_ref(), redirect.as_ref()).await;
            }
        }
    }

    drop(current);
    result
}

async fn read_refresh_token(store: &dyn CredentialStore) -> Result<RefreshToken, RefreshFailure> {
    match store.get_refresh_token().await {
        Ok(Some(token)) => Ok(token),
        Ok(None) => Err(RefreshFailure::MissingRefreshToken),
        Err(e) => {
            warn!("Could not read refresh token, treating session as signed out: {}", e);
            Err(RefreshFailure::MissingRefreshToken)
        }
    }
}

async fn request_new_access_token(
    transport: &HttpTransport,
    refresh_token: &RefreshToken,
) -> Result<AccessToken, RefreshFailure> {
    let request = ApiRequest::post(REFRESH_ENDPOINT)
        .json(&RefreshRequest { refresh_token: refresh_token.expose() })
        .map_err(|e| RefreshFailure::Rejected { status: 0, message: e.message })?;

    let response: RefreshResponse = transport.request(request).await.map_err(into_failure)?;
    Ok(response.access_token)
}

fn into_failure(error: ApiError) -> RefreshFailure {
    match error.kind {
        ApiErrorKind::Network => RefreshFailure::Network(error.message),
        _ => RefreshFailure::Rejected { status: error.status, message: error.message },
    }
}

fn signs_out(policy: &RefreshPolicy, failure: &RefreshFailure) -> bool {
    match failure {
        RefreshFailure::Network(_) => policy.sign_out_on_network_error,
        RefreshFailure::Superseded => false,
        _ => true,
    }
}

fn log_failure(failure: &RefreshFailure) {
    match failure {
        RefreshFailure::MissingRefreshToken => {
            warn!("Token refresh not attempted: no refresh token stored")
        }
        RefreshFailure::Rejected { status, message } => {
            error!("Token refresh rejected by server (status {}): {}", status, message)
        }
        RefreshFailure::Network(message) => {
            error!("Token refresh got no response from server: {}", message)
        }
        RefreshFailure::Storage(message) => {
            error!("Token refresh succeeded but the new token could not be stored: {}", message)
        }
        RefreshFailure::Superseded => {
            info!("Token refresh result dropped: the session changed while it was in flight")
        }
    }
}

/// Credentials are gone before the redirect fires.
async fn end_session(store: &dyn CredentialStore, redirect: &dyn SignInRedirect) {
    if let Err(e) = store.clear_session().await {
        error!("Failed to clear credentials after refresh failure: {}", e);
    }
    info!("Session ended, redirecting to sign-in");
    redirect.redirect_to_sign_in();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientConfig, credentials::MemoryCredentialStore, redirect::NoRedirect};
    use mobank_core::authentication::types::TokenPair;
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    fn coordinator(
        base_url: &str,
        store: Arc<MemoryCredentialStore>,
        redirect: Arc<dyn SignInRedirect>,
        policy: RefreshPolicy,
    ) -> RefreshCoordinator {
        let transport = HttpTransport::new(&ClientConfig::new(base_url)).unwrap();
        RefreshCoordinator::new(transport, store, redirect, policy)
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_calling_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let redirects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&redirects);
        let store = Arc::new(MemoryCredentialStore::new());
        let coordinator = coordinator(
            &server.uri(),
            store,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            RefreshPolicy::default(),
        );

        let failure = coordinator.refresh().await.unwrap_err();

        assert_eq!(failure, RefreshFailure::MissingRefreshToken);
        assert_eq!(redirects.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_success_persists_token_and_is_reused_for_stale_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({ "refreshToken": "rt-123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responseSuccessful": true,
                "responseMessage": "Token refreshed",
                "responseBody": { "accessToken": "at-456" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::with_tokens(TokenPair::new("stale", "rt-123")));
        let coordinator = coordinator(
            &server.uri(),
            Arc::clone(&store),
            Arc::new(NoRedirect),
            RefreshPolicy::default(),
        );

        let dispatched_at = coordinator.epoch();
        let token = coordinator.refresh_after(Some(dispatched_at)).await.unwrap();
        assert_eq!(token, AccessToken::new("at-456"));
        assert_eq!(store.get_access_token().await.unwrap(), Some(AccessToken::new("at-456")));
        assert_eq!(coordinator.epoch(), dispatched_at + 1);

        // A request dispatched before that refresh does not trigger another one.
        let reused = coordinator.refresh_after(Some(dispatched_at)).await.unwrap();
        assert_eq!(reused, AccessToken::new("at-456"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responseSuccessful": false,
                "responseMessage": "Refresh token expired",
                "responseBody": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::with_tokens(TokenPair::new("stale", "rt-123")));
        let coordinator = coordinator(
            &server.uri(),
            Arc::clone(&store),
            Arc::new(NoRedirect),
            RefreshPolicy::default(),
        );

        let failure = coordinator.refresh().await.unwrap_err();

        assert_eq!(
            failure,
            RefreshFailure::Rejected { status: 200, message: "Refresh token expired".to_string() }
        );
        assert_eq!(store.get_access_token().await.unwrap(), None);
        assert_eq!(store.get_refresh_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_network_failure_can_keep_session() {
        let store = Arc::new(MemoryCredentialStore::with_tokens(TokenPair::new("stale", "rt-123")));
        let coordinator = coordinator(
            "http://127.0.0.1:9",
            Arc::clone(&store),
            Arc::new(NoRedirect),
            RefreshPolicy { sign_out_on_network_error: false },
        );

        let failure = coordinator.refresh().await.unwrap_err();

        assert!(matches!(failure, RefreshFailure::Network(_)));
        assert_eq!(store.get_refresh_token().await.unwrap().unwrap().expose(), "rt-123");
    }

    #[tokio::test]
    async fn test_reset_forgets_latest_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responseSuccessful": true,
                "responseMessage": "ok",
                "responseBody": { "accessToken": "at-456" }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::with_tokens(TokenPair::new("stale", "rt-123")));
        let coordinator =
            coordinator(&server.uri(), store, Arc::new(NoRedirect), RefreshPolicy::default());

        coordinator.refresh_after(Some(0)).await.unwrap();
        coordinator.reset().await;
        coordinator.refresh_after(Some(0)).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_outlived_by_reset_writes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "responseSuccessful": true,
                        "responseMessage": "ok",
                        "responseBody": { "accessToken": "at-456" }
                    }))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::with_tokens(TokenPair::new("stale", "rt-123")));
        let coordinator = coordinator(
            &server.uri(),
            Arc::clone(&store),
            Arc::new(NoRedirect),
            RefreshPolicy::default(),
        );

        let (result, ()) = tokio::join!(coordinator.refresh(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            coordinator.reset().await;
        });

        assert_eq!(result.unwrap_err(), RefreshFailure::Superseded);
        assert_eq!(store.get_access_token().await.unwrap(), Some(AccessToken::new("stale")));
        assert_eq!(coordinator.epoch(), 0);

        let error = coordinator.failure_to_error(RefreshFailure::Superseded, None);
        assert!(error.is_session_expired());
    }
}
