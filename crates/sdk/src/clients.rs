use std::sync::Arc;

use mobank_core::authentication::types::{AccessToken, UserIdentity};
use serde::de::DeserializeOwned;

use crate::{
    ClientConfig,
    api::{ApiClient, ApiRequest, ApiResult, AuthApi, HttpTransport, RefreshCoordinator},
    credentials::CredentialStore,
    redirect::SignInRedirect,
};

/// Entry point for the app: one per process (or per signed-in profile).
///
/// Owns two transports built from the same config: one behind the auth
/// pipeline for application traffic, and a bare one the refresh coordinator
/// uses for `auth/refresh`.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    api: Arc<ApiClient>,
    auth: AuthApi,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
        redirect: Arc<dyn SignInRedirect>,
    ) -> ApiResult<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        let refresh_transport = HttpTransport::new(&config)?;
        let coordinator = Arc::new(RefreshCoordinator::new(
            refresh_transport,
            Arc::clone(&store),
            redirect,
            config.refresh_policy,
        ));
        let api = Arc::new(ApiClient::new(transport, store, coordinator));

        Ok(Self { auth: AuthApi::new(Arc::clone(&api)), api, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    /// The authenticated client, for endpoint functions outside this crate.
    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub async fn request<T>(&self, request: ApiRequest) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.api.request(request).await
    }

    /// Forces a token refresh, sharing any refresh already in flight.
    pub async fn refresh_session(&self) -> ApiResult<AccessToken> {
        let coordinator = self.api.coordinator();
        coordinator.refresh().await.map_err(|failure| coordinator.failure_to_error(failure, None))
    }

    /// Identity stored at sign-in, without a network call.
    pub async fn current_user(&self) -> ApiResult<Option<UserIdentity>> {
        Ok(self.api.store().get_user().await?)
    }
}
