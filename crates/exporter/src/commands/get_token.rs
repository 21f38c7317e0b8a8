//! `get-token`: fetch a single access token and print it

use crate::config::{expand_home, DEFAULT_SERVICE_ACCOUNT_FILE};
use crate::output::{print_field, print_info, print_success, print_warning};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Args;
use exporter_lib::{compute::COMPUTE_BASE_URL, AuthorizedClient, BearerToken, VersionInfo};

/// Tokens closer than this to expiry get a warning
const EXPIRY_WARNING_MINUTES: i64 = 5;

#[derive(Args, Debug, Clone)]
pub struct GetTokenArgs {
    /// Path to the service account JSON file
    #[arg(long, env = "GCP_EXPORTER_SERVICE_ACCOUNT_FILE", default_value = DEFAULT_SERVICE_ACCOUNT_FILE)]
    pub service_account_file: String,
}

pub async fn run(args: GetTokenArgs, version: &VersionInfo) -> Result<()> {
    let path = expand_home(&args.service_account_file);

    let client = AuthorizedClient::from_service_account_file(&path, &version.user_agent())
        .context("could not prepare GCP client")?;
    let token = client
        .tokens()
        .token()
        .await
        .context("could not get token")?;

    print_token(&token);
    Ok(())
}

fn print_token(token: &BearerToken) {
    print_success("Received new token");
    println!();
    print_field("Token", &token.access_token);
    print_field("Type", &token.token_type);
    print_field("Expires at", &token.expiry.to_rfc3339());

    if token.expiry - Utc::now() < Duration::minutes(EXPIRY_WARNING_MINUTES) {
        print_warning("Token expires in less than five minutes");
    }

    println!();
    print_info("Example usage:");
    println!("{}", example_curl(token));
}

/// A `curl` call listing instances with the token
fn example_curl(token: &BearerToken) -> String {
    format!(
        "  curl -H \"Authorization: {}\" {}/projects/<project>/zones/<zone>/instances",
        token.authorization_header(),
        COMPUTE_BASE_URL
    )
}
