use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! secret_token {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// The raw token value. Only meant for building headers and request bodies.
            pub fn expose(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        // Tokens end up in tracing fields, keep them out of the logs.
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), redact(&self.0))
            }
        }
    };
}

secret_token!(
    /// Short-lived bearer credential attached to every authenticated request.
    AccessToken
);

secret_token!(
    /// Long-lived credential used only to mint a new access token.
    RefreshToken
);

fn redact(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    if value.chars().count() <= 8 {
        "***".to_string()
    } else {
        format!("{}***", visible)
    }
}
