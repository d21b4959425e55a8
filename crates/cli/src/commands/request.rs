use clap::Args;
use mobank::{ApiRequest, Client, Method};
use serde_json::Value;

use crate::error::CliError;

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// HTTP method: GET, POST, PUT, PATCH or DELETE
    pub method: String,

    /// Endpoint relative to the API base URL, e.g. `accounts/balance`
    pub endpoint: String,

    /// JSON request body
    #[clap(long, short)]
    pub data: Option<String>,

    /// Query parameter as key=value; repeatable
    #[clap(long = "query", short = 'q')]
    pub query: Vec<String>,
}

fn parse_method(method: &str) -> Result<Method, CliError> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        other => Err(CliError::Input(format!("unsupported method '{}'", other))),
    }
}

fn parse_query(pair: &str) -> Result<(&str, &str), CliError> {
    pair.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| CliError::Input(format!("query '{}' must look like key=value", pair)))
}

fn build_request(args: &RequestArgs) -> Result<ApiRequest, CliError> {
    let mut request = ApiRequest::new(parse_method(&args.method)?, args.endpoint.as_str());

    for pair in &args.query {
        let (key, value) = parse_query(pair)?;
        request = request.query(key, value);
    }

    if let Some(data) = &args.data {
        let body: Value = serde_json::from_str(data)?;
        request = request.json(&body)?;
    }

    Ok(request)
}

pub async fn handle_request(client: &Client, args: &RequestArgs) -> Result<(), CliError> {
    let request = build_request(args)?;
    let body: Value = client.request(request).await?;

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
