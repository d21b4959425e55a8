mod tokens;
pub use tokens::{AccessToken, RefreshToken};

mod token_pair;
pub use token_pair::TokenPair;

mod user_identity;
pub use user_identity::UserIdentity;
