use serde::{Deserialize, Serialize};

/// The minimal identity persisted next to the tokens so screens can greet the
/// user without a round trip.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), full_name: None, phone_number: None, email: None }
    }

    /// Best human readable label: full name, then phone number, then email, then id.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.phone_number.as_deref())
            .or(self.email.as_deref())
            .unwrap_or(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_in_order() {
        let mut user = UserIdentity::new("u-1");
        assert_eq!(user.display_name(), "u-1");

        user.email = Some("ada@example.com".to_string());
        assert_eq!(user.display_name(), "ada@example.com");

        user.phone_number = Some("+2348000000000".to_string());
        assert_eq!(user.display_name(), "+2348000000000");

        user.full_name = Some("Ada Obi".to_string());
        assert_eq!(user.display_name(), "Ada Obi");
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let json = serde_json::to_value(UserIdentity::new("u-1")).unwrap();
        assert_eq!(json, serde_json::json!({ "userId": "u-1" }));
    }
}
