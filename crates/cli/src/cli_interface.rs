use clap::{Parser, Subcommand};

use crate::commands::request::RequestArgs;

#[derive(Parser)]
#[command(author, version, about = "Command line client for the mobank API", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Session profile to use; each profile keeps its own stored tokens.
    #[clap(long, short, global = true, default_value = "default")]
    pub profile: String,

    /// API base URL. Falls back to MOBANK_API_URL, then the built-in default.
    #[clap(long, global = true, env = "MOBANK_API_URL")]
    pub api_url: Option<String>,

    /// Directory to load a .env file from, default is the current directory.
    #[clap(long, global = true)]
    pub path: Option<String>,

    /// Show debug logs on stderr.
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session for this profile
    Login {
        /// Phone number or email
        #[clap(long, short)]
        username: String,
    },
    /// Create an account; prompts for the OTP sent to the phone number
    Register {
        #[clap(long)]
        full_name: String,

        #[clap(long)]
        phone_number: String,

        #[clap(long)]
        email: Option<String>,
    },
    /// Verify an OTP and store the resulting session
    VerifyOtp {
        #[clap(long)]
        phone_number: String,

        /// The code; prompted for when omitted
        #[clap(long)]
        otp: Option<String>,
    },
    /// Sign out on the server and forget the stored session
    Logout,
    /// Show whether this profile is signed in
    Status,
    /// Exchange the refresh token for a new access token now
    Refresh,
    /// Send an authenticated request and print the response body
    Request(RequestArgs),
}
