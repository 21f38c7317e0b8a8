//! Cached, lazily refreshed bearer token

use super::credentials::ServiceAccountCredential;
use super::key::parse_private_key;
use super::requester::{TokenExchange, TokenRequester};
use super::BearerToken;
use async_trait::async_trait;
use chrono::Utc;
use rsa::RsaPrivateKey;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A failed refresh, labelled with the step that failed
#[derive(Debug, Error)]
#[error("failed on oauth2 token requesting: {step}: {source}")]
pub struct TokenSourceError {
    pub step: &'static str,
    #[source]
    pub source: Box<dyn StdError + Send + Sync>,
}

/// Anything that can hand out a currently valid access token
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn token(&self) -> Result<BearerToken, TokenSourceError>;
}

/// Refresh steps, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshStep {
    ReadCredentials,
    ParseKey,
    RequestToken,
}

impl RefreshStep {
    const ALL: [RefreshStep; 3] = [
        RefreshStep::ReadCredentials,
        RefreshStep::ParseKey,
        RefreshStep::RequestToken,
    ];

    fn label(self) -> &'static str {
        match self {
            RefreshStep::ReadCredentials => "could not read JWT configuration file",
            RefreshStep::ParseKey => "could not parse RSA key",
            RefreshStep::RequestToken => "could not get Token",
        }
    }
}

/// Scratch state threaded through one refresh
#[derive(Default)]
struct RefreshState {
    credential: Option<ServiceAccountCredential>,
    key: Option<RsaPrivateKey>,
    token: Option<BearerToken>,
}

/// Hands out the cached token while it is valid and refreshes it otherwise.
///
/// The lock is held across a refresh so concurrent callers wait for the
/// in-flight request instead of issuing their own.
pub struct TokenSource {
    credentials_path: PathBuf,
    exchange: Arc<dyn TokenExchange>,
    current: Mutex<Option<BearerToken>>,
}

impl TokenSource {
    pub fn new(credentials_path: impl Into<PathBuf>) -> Self {
        Self::with_exchange(credentials_path, Arc::new(TokenRequester::default()))
    }

    pub fn with_exchange(
        credentials_path: impl Into<PathBuf>,
        exchange: Arc<dyn TokenExchange>,
    ) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            exchange,
            current: Mutex::new(None),
        }
    }

    /// Return the cached token if it has not expired, otherwise fetch a new one
    pub async fn get_token(&self) -> Result<BearerToken, TokenSourceError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if token.is_valid() {
                debug!("Using cached token");
                return Ok(token.clone());
            }
        }

        let token = self.refresh().await?;
        info!(expiry = %token.expiry.to_rfc3339(), "Token refreshed");
        *current = Some(token.clone());

        Ok(token)
    }

    async fn refresh(&self) -> Result<BearerToken, TokenSourceError> {
        let mut state = RefreshState::default();

        for step in RefreshStep::ALL {
            debug!(step = ?step, "Running token refresh step");
            self.run_step(step, &mut state)
                .await
                .map_err(|source| TokenSourceError {
                    step: step.label(),
                    source,
                })?;
        }

        state
            .token
            .ok_or_else(|| missing(RefreshStep::RequestToken))
    }

    async fn run_step(
        &self,
        step: RefreshStep,
        state: &mut RefreshState,
    ) -> Result<(), Box<dyn StdError + Send + Sync>> {
        match step {
            RefreshStep::ReadCredentials => {
                state.credential =
                    Some(ServiceAccountCredential::read(&self.credentials_path).await?);
            }
            RefreshStep::ParseKey => {
                let credential = state.credential.as_ref().ok_or("credential not loaded")?;
                state.key = Some(parse_private_key(&credential.private_key)?);
            }
            RefreshStep::RequestToken => {
                let credential = state.credential.as_ref().ok_or("credential not loaded")?;
                let key = state.key.as_ref().ok_or("private key not parsed")?;
                state.token = Some(self.exchange.exchange(credential, key).await?);
            }
        }
        Ok(())
    }
}

fn missing(step: RefreshStep) -> TokenSourceError {
    TokenSourceError {
        step: step.label(),
        source: "step produced no result".into(),
    }
}

#[async_trait]
impl AccessTokenProvider for TokenSource {
    async fn token(&self) -> Result<BearerToken, TokenSourceError> {
        self.get_token().await
    }
}
