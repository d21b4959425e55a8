use std::{env, path::PathBuf, process::ExitCode, str::FromStr, sync::Arc};

use clap::Parser;
use mobank::{Client, ClientConfig, FileCredentialStore, SignInRedirect};
use mobank_core::{load_env_from_project_path, setup_logger};
use tracing::level_filters::LevelFilter;

use crate::{
    cli_interface::{Cli, Commands},
    commands::{request, session},
    console::{print_error_message, print_warn_message},
    error::CliError,
};

mod cli_interface;
mod commands;
mod console;
mod error;

const SESSION_EXPIRED_HINT: &str =
    "Your session has expired. Run `mobank login` to sign in again.";

fn resolve_path(override_path: &Option<String>) -> Result<PathBuf, CliError> {
    let path = match override_path {
        Some(path) => PathBuf::from_str(path)
            .map_err(|_| CliError::Input(format!("Invalid path provided: '{}'", path)))?,
        None => env::current_dir()
            .map_err(|_| CliError::Input("Failed to get current directory.".to_string()))?,
    };

    path.canonicalize().map_err(|e| {
        CliError::Input(format!("Failed to resolve path '{}': {}", path.display(), e))
    })
}

fn client_config(api_url: &Option<String>) -> ClientConfig {
    let config = ClientConfig::from_env();
    match api_url {
        Some(url) => ClientConfig { base_url: url.clone(), ..config },
        None => config,
    }
}

fn create_client(cli: &Cli) -> Result<Client, CliError> {
    let store = FileCredentialStore::for_profile(&cli.profile)?;
    let redirect: Arc<dyn SignInRedirect> = Arc::new(|| print_warn_message(SESSION_EXPIRED_HINT));

    Ok(Client::new(client_config(&cli.api_url), Arc::new(store), redirect)?)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let resolved_path = resolve_path(&cli.path)?;
    load_env_from_project_path(&resolved_path);

    let client = create_client(&cli)?;

    match &cli.command {
        Commands::Login { username } => session::handle_login(&client, username).await,
        Commands::Register { full_name, phone_number, email } => {
            session::handle_register(&client, full_name, phone_number, email).await
        }
        Commands::VerifyOtp { phone_number, otp } => {
            session::handle_verify_otp(&client, phone_number, otp).await
        }
        Commands::Logout => session::handle_logout(&client).await,
        Commands::Status => session::handle_status(&client, &cli.profile).await,
        Commands::Refresh => session::handle_refresh(&client).await,
        Commands::Request(args) => request::handle_request(&client, args).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logger(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::WARN });

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error_message(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults_to_default() {
        let cli = Cli::try_parse_from(["mobank", "status"]).unwrap();

        assert_eq!(cli.profile, "default");
        assert!(!cli.verbose);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "mobank",
            "login",
            "--username",
            "+2348000000000",
            "--profile",
            "work",
            "--api-url",
            "http://localhost:8080",
        ])
        .unwrap();

        assert_eq!(cli.profile, "work");
        assert_eq!(cli.api_url.as_deref(), Some("http://localhost:8080"));
        match cli.command {
            Commands::Login { username } => assert_eq!(username, "+2348000000000"),
            _ => panic!("expected login"),
        }
    }

    #[test]
    fn request_collects_repeated_query() {
        let cli = Cli::try_parse_from([
            "mobank",
            "request",
            "get",
            "accounts/transactions",
            "-q",
            "page=2",
            "-q",
            "size=20",
        ])
        .unwrap();

        match cli.command {
            Commands::Request(args) => {
                assert_eq!(args.method, "get");
                assert_eq!(args.query, vec!["page=2", "size=20"]);
                assert!(args.data.is_none());
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn login_requires_username() {
        assert!(Cli::try_parse_from(["mobank", "login"]).is_err());
    }

    #[test]
    fn api_url_flag_overrides_config() {
        let config = client_config(&Some("http://127.0.0.1:3000".to_string()));

        assert_eq!(config.base_url, "http://127.0.0.1:3000");
    }
}
