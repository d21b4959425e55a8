use serde::{Deserialize, Serialize};

use super::{AccessToken, RefreshToken};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(rename = "accessToken")]
    pub access_token: AccessToken,

    #[serde(rename = "refreshToken")]
    pub refresh_token: RefreshToken,
}

impl TokenPair {
    pub fn new(
        access_token: impl Into<AccessToken>,
        refresh_token: impl Into<RefreshToken>,
    ) -> Self {
        Self { access_token: access_token.into(), refresh_token: refresh_token.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_pair_uses_camel_case_on_the_wire() {
        let pair = TokenPair::new("at-1", "rt-1");
        let json = serde_json::to_value(&pair).unwrap();

        assert_eq!(json, serde_json::json!({ "accessToken": "at-1", "refreshToken": "rt-1" }));

        let parsed: TokenPair = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, pair);
    }
}
