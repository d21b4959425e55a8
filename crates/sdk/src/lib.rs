//! Client for the mobank banking API.
//!
//! Every call goes through [`ApiClient`], which attaches the stored bearer
//! token, unwraps the response envelope, and on a `401` refreshes the access
//! token once (shared by all requests that expired together) before replaying
//! the request. When the refresh fails the stored session is cleared and the
//! [`SignInRedirect`] hook fires.

mod api;
mod clients;
mod config;
pub mod credentials;
mod redirect;

pub use api::{
    ApiClient, ApiError, ApiErrorKind, ApiRequest, ApiResult, AuthApi, AuthSession, HttpTransport,
    LoginRequest, NO_RESPONSE_MESSAGE, REFRESH_ENDPOINT, REQUEST_STAGES, RESPONSE_STAGES,
    RawResponse, RefreshCoordinator, RefreshFailure, RegisterRequest, RegisterResponse,
    RequestStage, ResponseStage, SESSION_EXPIRED_MESSAGE, VerifyOtpRequest,
};
pub use clients::Client;
pub use config::{API_URL_ENV, ClientConfig, DEFAULT_API_URL, HTTP_TIMEOUT_ENV, RefreshPolicy};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StorageError};
pub use mobank_core::{
    Envelope,
    authentication::types::{AccessToken, RefreshToken, TokenPair, UserIdentity},
};
pub use redirect::{NoRedirect, SignInRedirect};
pub use reqwest::Method;
