//! The authenticated request path.
//!
//! A request runs through [`REQUEST_STAGES`] before it is sent and its response
//! through [`RESPONSE_STAGES`] afterwards, in table order. A response stage
//! either hands the exchange to the next stage, finishes the request, or, for
//! `HandleUnauthorized` only, replays the request with a fresh token and
//! restarts the response stages on the new response. The replayed request
//! carries its `retried` marker, so the replay can happen once at most.

use std::{fmt, sync::Arc};

use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{
    api::{
        http::{HttpTransport, RawResponse, decode_body},
        refresh::RefreshCoordinator,
        types::{ApiError, ApiRequest, ApiResult},
    },
    credentials::CredentialStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    AttachToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStage {
    DetectLogicalFailure,
    HandleUnauthorized,
    WrapError,
}

pub const REQUEST_STAGES: [RequestStage; 1] = [RequestStage::AttachToken];

pub const RESPONSE_STAGES: [ResponseStage; 3] = [
    ResponseStage::DetectLogicalFailure,
    ResponseStage::HandleUnauthorized,
    ResponseStage::WrapError,
];

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStage::AttachToken => write!(f, "attach_token"),
        }
    }
}

impl fmt::Display for ResponseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseStage::DetectLogicalFailure => write!(f, "detect_logical_failure"),
            ResponseStage::HandleUnauthorized => write!(f, "handle_unauthorized"),
            ResponseStage::WrapError => write!(f, "wrap_error"),
        }
    }
}

/// What came back from the transport: a response with any status, or no
/// response at all.
type Exchange = ApiResult<RawResponse>;

enum Step {
    Next(Exchange),
    Replay(Exchange),
    Done(ApiResult<serde_json::Value>),
}

/// A request plus the refresh epoch observed when its token was attached.
struct InFlightRequest {
    request: ApiRequest,
    dispatched_at: u64,
}

/// Client for application traffic: attaches the stored bearer token and
/// recovers from one expired-token 401 per request.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<HttpTransport>,
    store: Arc<dyn CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<HttpTransport>,
        store: Arc<dyn CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self { transport, store, coordinator }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Sends `request` through the pipeline and returns the envelope's
    /// `responseBody` decoded as `T`.
    pub async fn request<T>(&self, request: ApiRequest) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let body = self.execute(request).await?;
        decode_body(body)
    }

    pub async fn get<T>(&self, endpoint: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.request(ApiRequest::get(endpoint)).await
    }

    pub async fn get_with_query<T, Q>(&self, endpoint: &str, query: &[(&str, Q)]) -> ApiResult<T>
    where
        T: DeserializeOwned,
        Q: ToString,
    {
        let request = query.iter().fold(ApiRequest::get(endpoint), |request, (key, value)| {
            request.query(*key, value.to_string())
        });
        self.request(request).await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::post(endpoint).json(body)?).await
    }

    /// POST where only success matters; the envelope is still checked.
    pub async fn post_status<B>(&self, endpoint: &str, body: &B) -> ApiResult<()>
    where
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::post(endpoint).json(body)?).await?;
        Ok(())
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> ApiResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(ApiRequest::put(endpoint).json(body)?).await
    }

    pub async fn delete<T>(&self, endpoint: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.request(ApiRequest::delete(endpoint)).await
    }

    /// Runs the full pipeline and returns the raw envelope body.
    pub async fn execute(&self, request: ApiRequest) -> ApiResult<serde_json::Value> {
        let mut in_flight = InFlightRequest { request, dispatched_at: self.coordinator.epoch() };

        for stage in REQUEST_STAGES {
            debug!("{} {} stage {}", in_flight.request.method, in_flight.request.endpoint, stage);
            match stage {
                RequestStage::AttachToken => self.attach_token(&mut in_flight.request).await?,
            }
        }

        let mut exchange = self.transport.send(&in_flight.request).await;
        let mut stages = RESPONSE_STAGES.iter();

        while let Some(stage) = stages.next() {
            debug!("{} {} stage {}", in_flight.request.method, in_flight.request.endpoint, stage);
            let step = match stage {
                ResponseStage::DetectLogicalFailure => detect_logical_failure(exchange),
                ResponseStage::HandleUnauthorized => {
                    self.handle_unauthorized(&mut in_flight, exchange).await
                }
                ResponseStage::WrapError => wrap_error(exchange),
            };

            match step {
                Step::Next(next) => exchange = next,
                Step::Replay(next) => {
                    exchange = next;
                    stages = RESPONSE_STAGES.iter();
                }
                Step::Done(result) => return result,
            }
        }

        Err(ApiError::local("Response was not handled by any pipeline stage"))
    }

    /// Attaches `Authorization: Bearer <token>` when a token is stored. A
    /// store that cannot be read counts as signed out.
    async fn attach_token(&self, request: &mut ApiRequest) -> ApiResult<()> {
        match self.store.get_access_token().await {
            Ok(Some(token)) => request.set_bearer(&token),
            Ok(None) => Ok(()),
            Err(e) => {
                warn!("Could not read access token, sending request unauthenticated: {}", e);
                Ok(())
            }
        }
    }

    async fn handle_unauthorized(
        &self,
        in_flight: &mut InFlightRequest,
        exchange: Exchange,
    ) -> Step {
        let response = match exchange {
            Ok(response) if response.status == StatusCode::UNAUTHORIZED => response,
            other => return Step::Next(other),
        };

        let request = &mut in_flight.request;
        if !request.refresh_on_unauthorized {
            return Step::Next(Ok(response));
        }
        if request.retried {
            debug!("{} {} unauthorized after retry, giving up", request.method, request.endpoint);
            return Step::Next(Ok(response));
        }
        request.retried = true;

        let token = match self.coordinator.refresh_after(Some(in_flight.dispatched_at)).await {
            Ok(token) => token,
            Err(failure) => {
                let raw_body = response.into_http_error().raw_body;
                return Step::Done(Err(self.coordinator.failure_to_error(failure, raw_body)));
            }
        };

        if let Err(e) = request.set_bearer(&token) {
            return Step::Done(Err(e));
        }

        debug!("{} {} replaying with refreshed token", request.method, request.endpoint);
        Step::Replay(self.transport.send(request).await)
    }
}

fn detect_logical_failure(exchange: Exchange) -> Step {
    match exchange {
        Ok(response) => match response.envelope_outcome() {
            Some(outcome) => Step::Done(outcome),
            None => Step::Next(Ok(response)),
        },
        Err(e) => Step::Next(Err(e)),
    }
}

fn wrap_error(exchange: Exchange) -> Step {
    match exchange {
        Ok(response) => Step::Done(Err(response.into_http_error())),
        Err(e) => Step::Done(Err(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ApiErrorKind;
    use serde_json::json;

    #[test]
    fn test_stage_order() {
        assert_eq!(REQUEST_STAGES, [RequestStage::AttachToken]);
        assert_eq!(
            RESPONSE_STAGES.map(|stage| stage.to_string()),
            ["detect_logical_failure", "handle_unauthorized", "wrap_error"]
        );
    }

    #[test]
    fn test_detect_logical_failure_finishes_on_2xx_only() {
        let ok = RawResponse {
            status: StatusCode::OK,
            body: json!({ "responseSuccessful": true, "responseBody": 1 }).to_string(),
        };
        assert!(matches!(detect_logical_failure(Ok(ok)), Step::Done(Ok(_))));

        let unauthorized = RawResponse { status: StatusCode::UNAUTHORIZED, body: String::new() };
        assert!(matches!(detect_logical_failure(Ok(unauthorized)), Step::Next(Ok(_))));

        assert!(matches!(detect_logical_failure(Err(ApiError::network())), Step::Next(Err(_))));
    }

    #[test]
    fn test_wrap_error_always_finishes() {
        let forbidden = RawResponse {
            status: StatusCode::FORBIDDEN,
            body: json!({ "responseSuccessful": false, "responseMessage": "PIN locked" })
                .to_string(),
        };
        match wrap_error(Ok(forbidden)) {
            Step::Done(Err(err)) => {
                assert_eq!(err.status, 403);
                assert_eq!(err.message, "PIN locked");
                assert_eq!(err.kind, ApiErrorKind::Http);
            }
            _ => panic!("expected a finished error"),
        }

        assert!(matches!(
            wrap_error(Err(ApiError::network())),
            Step::Done(Err(e)) if e.is_network()
        ));
    }
}
