use std::sync::Arc;

use mobank_core::authentication::types::{AccessToken, RefreshToken, TokenPair, UserIdentity};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{info, warn};

use crate::api::{
    pipeline::ApiClient,
    types::{ApiRequest, ApiResult},
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Phone number or email.
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: String,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
    #[serde(default)]
    pub otp_required: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub phone_number: String,
    pub otp: String,
}

/// Body of a successful login or OTP verification.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub user: UserIdentity,
}

#[derive(Clone)]
pub struct AuthApi {
    client: Arc<ApiClient>,
}

impl AuthApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Signs in and stores the new session.
    pub async fn login(&self, request: &LoginRequest) -> ApiResult<UserIdentity> {
        let session: AuthSession = self.sign_in_call("auth/login", request).await?;
        self.start_session(session).await
    }

    /// Creates the account. Credentials only exist after [`verify_otp`](Self::verify_otp).
    pub async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisterResponse> {
        self.sign_in_call("auth/register", request).await
    }

    /// Completes registration or a device login and stores the new session.
    pub async fn verify_otp(&self, request: &VerifyOtpRequest) -> ApiResult<UserIdentity> {
        let session: AuthSession = self.sign_in_call("auth/verify-otp", request).await?;
        self.start_session(session).await
    }

    pub async fn resend_otp(&self, phone_number: &str) -> ApiResult<()> {
        let _: Option<serde_json::Value> = self
            .sign_in_call("auth/resend-otp", &serde_json::json!({ "phoneNumber": phone_number }))
            .await?;
        Ok(())
    }

    /// Fetches the signed-in user and refreshes the stored identity.
    pub async fn me(&self) -> ApiResult<UserIdentity> {
        let user: UserIdentity = self.client.get("auth/me").await?;
        self.client.store().set_user(&user).await?;
        Ok(user)
    }

    /// Tells the server to end the session, then forgets it locally whatever
    /// the server answered.
    pub async fn logout(&self) -> ApiResult<()> {
        if let Err(e) = self.client.post_status("auth/logout", &serde_json::json!({})).await {
            warn!("Server logout failed, clearing local session anyway: {}", e);
        }
        let _gate = self.client.coordinator().begin_session().await;
        self.client.store().clear_session().await?;
        info!("Signed out");
        Ok(())
    }

    /// Both tokens are stored.
    pub async fn is_authenticated(&self) -> bool {
        let store = self.client.store();
        matches!(
            (store.get_access_token().await, store.get_refresh_token().await),
            (Ok(Some(_)), Ok(Some(_)))
        )
    }

    /// Endpoints used before a session exists. A 401 from them is the
    /// server's answer (bad credentials, wrong OTP), not an expired token.
    async fn sign_in_call<T, B>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.client.request(ApiRequest::post(endpoint).json(body)?.without_refresh()).await
    }

    async fn start_session(&self, session: AuthSession) -> ApiResult<UserIdentity> {
        let _gate = self.client.coordinator().begin_session().await;
        let store = self.client.store();
        store.set_tokens(&TokenPair::new(session.access_token, session.refresh_token)).await?;
        store.set_user(&session.user).await?;
        info!("Signed in as {}", session.user.user_id);
        Ok(session.user)
    }
}
