use serde::{Deserialize, Serialize};

/// The wrapper every API response is delivered in.
///
/// The HTTP status alone does not decide the outcome: a `200` carrying
/// `responseSuccessful: false` is a failed call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T = serde_json::Value> {
    pub response_successful: bool,

    #[serde(default)]
    pub response_message: String,

    /// Absent or `null` on most failures.
    #[serde(default = "Option::default")]
    pub response_body: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(body: T) -> Self {
        Self {
            response_successful: true,
            response_message: "Success".to_string(),
            response_body: Some(body),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { response_successful: false, response_message: message.into(), response_body: None }
    }

    /// The payload when the server reported success, otherwise the server's message.
    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.response_successful {
            Ok(self.response_body)
        } else {
            Err(self.response_message)
        }
    }
}
