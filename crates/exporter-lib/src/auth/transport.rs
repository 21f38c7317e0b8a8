//! HTTP client that authenticates every request with a bearer token

use super::credentials::{check_credentials_file, CredentialsError};
use super::requester::TokenRequester;
use super::source::{AccessTokenProvider, TokenSource, TokenSourceError};
use reqwest::header::AUTHORIZATION;
use reqwest::{IntoUrl, RequestBuilder};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Timeouts applied to every request the exporter makes
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error("could not build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// A `reqwest::Client` paired with a token provider
#[derive(Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl AuthorizedClient {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self { http, tokens }
    }

    /// Build a client whose tokens come from the service account file at
    /// `credentials_path`. The file is checked up front; it is read lazily
    /// on the first request.
    pub fn from_service_account_file(
        credentials_path: &Path,
        user_agent: &str,
    ) -> Result<Self, ClientError> {
        check_credentials_file(credentials_path)?;

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let requester = TokenRequester::new(http.clone());
        let tokens = TokenSource::with_exchange(credentials_path, Arc::new(requester));

        Ok(Self::new(http, Arc::new(tokens)))
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn tokens(&self) -> Arc<dyn AccessTokenProvider> {
        self.tokens.clone()
    }

    /// Start a GET request carrying the current token
    pub async fn get(&self, url: impl IntoUrl) -> Result<RequestBuilder, TokenSourceError> {
        let token = self.tokens.token().await?;
        debug!(token_type = %token.token_type, "Authorizing request");

        Ok(self
            .http
            .get(url)
            .header(AUTHORIZATION, token.authorization_header()))
    }
}
