pub mod authentication;
mod envelope;
pub use envelope::Envelope;
mod environment;
pub use environment::{env_var_or, load_env_from_project_path};
mod logger;
pub use logger::{setup_info_logger, setup_logger};
