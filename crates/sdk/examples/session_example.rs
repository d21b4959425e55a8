use std::sync::Arc;

use mobank::{Client, ClientConfig, FileCredentialStore, LoginRequest};
use mobank_core::setup_info_logger;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_info_logger();

    // Reads MOBANK_API_URL / MOBANK_HTTP_TIMEOUT_SECS
    let config = ClientConfig::from_env();
    let store = Arc::new(FileCredentialStore::for_profile("example")?);
    let client = Client::new(
        config,
        store,
        Arc::new(|| println!("Session expired, please sign in again")),
    )?;

    if !client.auth().is_authenticated().await {
        let user = client
            .auth()
            .login(&LoginRequest {
                username: "+2348000000000".to_string(),
                password: "your_password".to_string(),
            })
            .await?;
        println!("Signed in as {}", user.display_name());
    }

    // A 401 here is refreshed and replayed transparently
    match client.api().get::<Value>("accounts/balance").await {
        Ok(balance) => println!("Balance: {}", balance),
        Err(e) => println!("Request failed: {}", e.user_message()),
    }

    Ok(())
}
