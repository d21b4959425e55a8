mod authentication;
pub mod http;
pub mod pipeline;
pub mod refresh;
mod types;

pub use authentication::{
    AuthApi, AuthSession, LoginRequest, RegisterRequest, RegisterResponse, VerifyOtpRequest,
};
pub use http::{HttpTransport, RawResponse};
pub use pipeline::{ApiClient, REQUEST_STAGES, RESPONSE_STAGES, RequestStage, ResponseStage};
pub use refresh::{REFRESH_ENDPOINT, RefreshCoordinator, RefreshFailure};
pub use types::{
    ApiError, ApiErrorKind, ApiRequest, ApiResult, NO_RESPONSE_MESSAGE, SESSION_EXPIRED_MESSAGE,
};
