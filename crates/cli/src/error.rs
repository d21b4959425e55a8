use thiserror::Error;

/// Top-level CLI error
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{}", .0.user_message())]
    Api(#[from] mobank::ApiError),

    #[error("Credential storage error: {0}")]
    Storage(#[from] mobank::StorageError),

    #[error("Terminal interaction failed: {0}")]
    Terminal(#[from] dialoguer::Error),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
