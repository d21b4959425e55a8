use mobank_core::Envelope;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    ClientConfig,
    api::types::{ApiError, ApiRequest, ApiResult},
};

/// A bare HTTP client bound to the API base URL.
///
/// It knows nothing about credentials. The application traffic goes through an
/// [`ApiClient`](crate::ApiClient) wrapping one of these; the token refresh
/// call uses a separate instance directly so it can never re-enter the auth
/// pipeline.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .default_headers(default_headers())
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::local(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url: config.base_url.clone() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint.trim_start_matches('/'))
    }

    /// Sends the request once. Only a missing response is an error here; any
    /// status code comes back as a [`RawResponse`] for the caller to judge.
    pub async fn send(&self, request: &ApiRequest) -> ApiResult<RawResponse> {
        let url = self.build_url(&request.endpoint);
        debug!("{} {}", request.method, url);

        let mut builder =
            self.client.request(request.method.clone(), &url).headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!("{} {} -> {}", request.method, url, status);
        Ok(RawResponse { status, body })
    }

    /// Sends the request and unwraps the envelope, with no token handling.
    pub async fn request<T>(&self, request: ApiRequest) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(&request).await?;
        match response.envelope_outcome() {
            Some(outcome) => outcome.and_then(decode_body::<T>),
            None => Err(response.into_http_error()),
        }
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Turns an envelope payload into the caller's type. A `null`/absent body
/// decodes fine into `()` and `Option<_>`.
pub(crate) fn decode_body<T>(body: serde_json::Value) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    serde_json::from_value(body)
        .map_err(|e| ApiError::local(format!("Failed to decode response body: {}", e)))
}

/// Status plus the unparsed body of a response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    fn raw_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// `None` for non-2xx responses. For 2xx: the payload when the envelope
    /// reports success, a logical failure when it does not, a local failure
    /// when there is no envelope to read.
    pub(crate) fn envelope_outcome(&self) -> Option<ApiResult<serde_json::Value>> {
        if !self.status.is_success() {
            return None;
        }

        let envelope: Envelope<serde_json::Value> = match serde_json::from_str(&self.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                return Some(Err(ApiError::local(format!("Malformed response envelope: {}", e))));
            }
        };

        Some(if envelope.response_successful {
            Ok(envelope.response_body.unwrap_or(serde_json::Value::Null))
        } else {
            Err(ApiError::logical(envelope.response_message, self.status, self.raw_json()))
        })
    }

    /// Wraps a non-2xx response. The envelope's message is preferred over the
    /// status text when the body carries one.
    pub(crate) fn into_http_error(self) -> ApiError {
        let raw_body = self.raw_json();
        let message = raw_body
            .as_ref()
            .and_then(|json| json.get("responseMessage"))
            .and_then(|message| message.as_str())
            .filter(|message| !message.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.status.canonical_reason().unwrap_or("Request failed").to_string()
            });

        ApiError::http(message, self.status, raw_body)
    }
}
