use mobank_core::authentication::types::AccessToken;
use reqwest::{
    Method, StatusCode,
    header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde::Serialize;
use thiserror::Error;

use crate::{api::refresh::RefreshFailure, credentials::StorageError};

pub const NO_RESPONSE_MESSAGE: &str = "No response from server";
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired";

const CONNECTIVITY_MESSAGE: &str =
    "We couldn't reach the server. Check your internet connection and try again.";
const SIGN_IN_AGAIN_MESSAGE: &str = "Your session has expired. Please sign in again.";
const GENERIC_MESSAGE: &str = "Something went wrong. Please try again.";

/// Which terminal state a failed request ended in.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiErrorKind {
    /// 2xx with `responseSuccessful: false`.
    Logical,
    /// Non-2xx status, including a 401 that survived its one retry.
    Http,
    /// No response at all (connect failure, timeout).
    Network,
    /// Failure on this side of the wire, such as an undecodable body.
    Local,
    /// A 401 whose refresh failed; credentials were cleared.
    SessionExpired(RefreshFailure),
}

/// Every failure a caller of the API sees.
///
/// `status` is the HTTP status, or `0` when no response was received or the
/// failure happened locally.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub status: u16,
    pub raw_body: Option<serde_json::Value>,
    pub kind: ApiErrorKind,
}

impl ApiError {
    pub fn logical(
        message: impl Into<String>,
        status: StatusCode,
        raw_body: Option<serde_json::Value>,
    ) -> Self {
        Self {
            message: message.into(),
            status: status.as_u16(),
            raw_body,
            kind: ApiErrorKind::Logical,
        }
    }

    pub fn http(
        message: impl Into<String>,
        status: StatusCode,
        raw_body: Option<serde_json::Value>,
    ) -> Self {
        Self {
            message: message.into(),
            status: status.as_u16(),
            raw_body,
            kind: ApiErrorKind::Http,
        }
    }

    pub fn network() -> Self {
        Self {
            message: NO_RESPONSE_MESSAGE.to_string(),
            status: 0,
            raw_body: None,
            kind: ApiErrorKind::Network,
        }
    }

    pub fn local(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: 0, raw_body: None, kind: ApiErrorKind::Local }
    }

    pub fn session_expired(failure: RefreshFailure, raw_body: Option<serde_json::Value>) -> Self {
        Self {
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            status: StatusCode::UNAUTHORIZED.as_u16(),
            raw_body,
            kind: ApiErrorKind::SessionExpired(failure),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED.as_u16()
    }

    pub fn is_network(&self) -> bool {
        self.kind == ApiErrorKind::Network
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self.kind, ApiErrorKind::SessionExpired(_))
    }

    /// Text fit for showing to the user as-is.
    pub fn user_message(&self) -> &str {
        match &self.kind {
            ApiErrorKind::Network => CONNECTIVITY_MESSAGE,
            ApiErrorKind::SessionExpired(_) => SIGN_IN_AGAIN_MESSAGE,
            ApiErrorKind::Local => GENERIC_MESSAGE,
            ApiErrorKind::Logical | ApiErrorKind::Http if self.message.trim().is_empty() => {
                GENERIC_MESSAGE
            }
            ApiErrorKind::Logical | ApiErrorKind::Http => &self.message,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_request() || error.is_body() {
            ApiError::network()
        } else {
            ApiError::local(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        ApiError::local(format!("Serialization error: {}", error))
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        ApiError::local(format!("Credential storage error: {}", error))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// A request that can be sent, inspected and sent again.
///
/// `retried` is set the first time the request is replayed after a token
/// refresh; a replayed request is never replayed again. Requests built with
/// [`without_refresh`](Self::without_refresh) are never replayed at all.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) endpoint: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<serde_json::Value>,
    pub(crate) headers: HeaderMap,
    pub(crate) retried: bool,
    pub(crate) refresh_on_unauthorized: bool,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
            retried: false,
            refresh_on_unauthorized: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ApiResult<Self> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// A 401 is returned to the caller as is, without a token refresh. For
    /// endpoints that answer bad credentials with 401.
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }

    pub fn refreshes_on_unauthorized(&self) -> bool {
        self.refresh_on_unauthorized
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The bearer token currently attached, if any.
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    /// Replaces any existing `Authorization` header.
    pub(crate) fn set_bearer(&mut self, token: &AccessToken) -> ApiResult<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|_| ApiError::local("Access token is not a valid header value"))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}
