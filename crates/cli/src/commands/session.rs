use dialoguer::{Input, Password};
use mobank::{Client, LoginRequest, RegisterRequest, UserIdentity, VerifyOtpRequest};

use crate::{
    console::{print_success_message, print_warn_message},
    error::CliError,
};

fn prompt_password(confirm: bool) -> Result<String, CliError> {
    let prompt = Password::new().with_prompt("Password");
    let password = if confirm {
        prompt.with_confirmation("Confirm password", "Passwords do not match").interact()?
    } else {
        prompt.interact()?
    };

    if password.is_empty() {
        return Err(CliError::Input("password cannot be empty".to_string()));
    }

    Ok(password)
}

fn prompt_otp() -> Result<String, CliError> {
    let otp: String = Input::new().with_prompt("OTP code").interact_text()?;
    normalize_otp(&otp)
}

/// Trims the code and rejects anything that is not all digits.
fn normalize_otp(otp: &str) -> Result<String, CliError> {
    let otp = otp.trim();
    if otp.is_empty() || !otp.chars().all(|c| c.is_ascii_digit()) {
        return Err(CliError::Input(format!("'{}' is not a valid OTP code", otp)));
    }

    Ok(otp.to_string())
}

fn signed_in_message(user: &UserIdentity) -> String {
    format!("Signed in as {}", user.display_name())
}

pub async fn handle_login(client: &Client, username: &str) -> Result<(), CliError> {
    let password = prompt_password(false)?;
    let user = client
        .auth()
        .login(&LoginRequest { username: username.to_string(), password })
        .await?;

    print_success_message(&signed_in_message(&user));
    Ok(())
}

pub async fn handle_register(
    client: &Client,
    full_name: &str,
    phone_number: &str,
    email: &Option<String>,
) -> Result<(), CliError> {
    let password = prompt_password(true)?;
    let registered = client
        .auth()
        .register(&RegisterRequest {
            full_name: full_name.to_string(),
            phone_number: phone_number.to_string(),
            email: email.clone(),
            password,
        })
        .await?;

    print_success_message(&format!("Account {} created", registered.user_id));
    if !registered.otp_required {
        println!("Run `mobank login --username {}` to sign in.", phone_number);
        return Ok(());
    }

    handle_verify_otp(client, phone_number, &None).await
}

pub async fn handle_verify_otp(
    client: &Client,
    phone_number: &str,
    otp: &Option<String>,
) -> Result<(), CliError> {
    let otp = match otp {
        Some(otp) => normalize_otp(otp)?,
        None => prompt_otp()?,
    };

    let user = client
        .auth()
        .verify_otp(&VerifyOtpRequest { phone_number: phone_number.to_string(), otp })
        .await?;

    print_success_message(&signed_in_message(&user));
    Ok(())
}

pub async fn handle_logout(client: &Client) -> Result<(), CliError> {
    if !client.auth().is_authenticated().await {
        print_warn_message("Not signed in");
        return Ok(());
    }

    client.auth().logout().await?;
    print_success_message("Signed out");
    Ok(())
}

pub async fn handle_status(client: &Client, profile: &str) -> Result<(), CliError> {
    println!("Profile: {}", profile);
    println!("API: {}", client.config().base_url);

    if !client.auth().is_authenticated().await {
        print_warn_message("Not signed in");
        return Ok(());
    }

    match client.current_user().await? {
        Some(user) => print_success_message(&signed_in_message(&user)),
        None => print_success_message("Signed in"),
    }

    Ok(())
}

pub async fn handle_refresh(client: &Client) -> Result<(), CliError> {
    client.refresh_session().await?;
    print_success_message("Access token refreshed");
    Ok(())
}
