use std::path::Path;

use dotenvy::{dotenv, from_path};

/// Loads environment variables from a .env file in the project directory.
///
/// Falls back to a .env in the current working directory when the project
/// directory has none. Variables already set in the process environment win.
///
/// # Arguments
/// * `project_path` - Directory to look for a .env file in
pub fn load_env_from_project_path(project_path: &Path) {
    if from_path(project_path.join(".env")).is_err() {
        dotenv().ok();
    }
}

/// Reads an environment variable, using `fallback` when it is unset or blank.
pub fn env_var_or(key: &str, fallback: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => fallback.to_string(),
    }
}
