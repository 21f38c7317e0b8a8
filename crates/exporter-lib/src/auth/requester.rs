//! OAuth2 JWT-bearer token exchange

use super::credentials::ServiceAccountCredential;
use super::jws::{AssertionEncoder, JwsClaims, JwsError, JwsHeader, Rs256Encoder};
use super::BearerToken;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use rsa::RsaPrivateKey;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Token endpoint every assertion is exchanged against
pub const TOKEN_REQUEST_URL: &str = "https://www.googleapis.com/oauth2/v4/token";

/// Scopes requested for the exporter's tokens
pub const CLAIM_SCOPE: &str =
    "https://www.googleapis.com/auth/cloud-platform https://www.googleapis.com/auth/compute.readonly";

/// Audience of the assertion
pub const CLAIM_AUD: &str = "https://www.googleapis.com/oauth2/v4/token";

/// Grant type of the RFC 7523 JWT-bearer flow
pub const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime written into the assertion's `exp` claim, in seconds
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Characters escaped when a value is used as a URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'[')
    .add(b']');

/// Errors raised by a single token exchange
#[derive(Debug, Error)]
pub enum TokenRequestError {
    #[error("could not encode JWT: {0}")]
    Encoding(#[source] JwsError),

    #[error("could not prepare HTTP Request: {0}")]
    RequestBuild(#[source] reqwest::Error),

    #[error("error during HTTP Request: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("error while reading response body: {0}")]
    ResponseRead(#[source] reqwest::Error),

    #[error("error while parsing response body: {0}")]
    ResponseParse(#[source] serde_json::Error),

    #[error("error while parsing response body: expected values are empty (HTTP status {status})")]
    InvalidTokenResponse { status: u16 },
}

/// Exchanges a credential and its parsed key for a bearer token
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(
        &self,
        credential: &ServiceAccountCredential,
        key: &RsaPrivateKey,
    ) -> Result<BearerToken, TokenRequestError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_in: i64,
}

impl TokenResponse {
    fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.token_type.is_empty() && self.expires_in > 0
    }
}

/// Form body of the token request. Only the grant type is escaped; the
/// assertion is base64url and needs no escaping.
pub fn token_request_body(assertion: &str) -> String {
    format!(
        "grant_type={}&assertion={}",
        utf8_percent_encode(JWT_GRANT_TYPE, PATH_SEGMENT),
        assertion
    )
}

/// Signs assertions and posts them to the token endpoint
#[derive(Clone)]
pub struct TokenRequester {
    http: reqwest::Client,
    endpoint: String,
    encoder: Arc<dyn AssertionEncoder>,
}

impl Default for TokenRequester {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl TokenRequester {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: TOKEN_REQUEST_URL.to_string(),
            encoder: Arc::new(Rs256Encoder),
        }
    }

    /// Post to a different token endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sign assertions with a different encoder
    pub fn with_encoder(mut self, encoder: Arc<dyn AssertionEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    fn prepare_request(
        &self,
        credential: &ServiceAccountCredential,
        key: &RsaPrivateKey,
    ) -> Result<reqwest::Request, TokenRequestError> {
        debug!("Preparing token request");

        let iat = Utc::now();
        let exp = iat + Duration::seconds(ASSERTION_LIFETIME_SECS);

        let header = JwsHeader::rs256(
            Some(credential.private_key_id.clone()).filter(|kid| !kid.is_empty()),
        );
        let claims = JwsClaims {
            iss: credential.client_email.clone(),
            scope: CLAIM_SCOPE.to_string(),
            aud: CLAIM_AUD.to_string(),
            exp: exp.timestamp(),
            iat: iat.timestamp(),
        };

        debug!("Encoding JWT assertion");
        let assertion = self
            .encoder
            .encode(&header, &claims, key)
            .map_err(TokenRequestError::Encoding)?;

        self.http
            .post(&self.endpoint)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(token_request_body(&assertion))
            .build()
            .map_err(TokenRequestError::RequestBuild)
    }
}

#[async_trait]
impl TokenExchange for TokenRequester {
    async fn exchange(
        &self,
        credential: &ServiceAccountCredential,
        key: &RsaPrivateKey,
    ) -> Result<BearerToken, TokenRequestError> {
        debug!("Requesting new oAuth2 token");

        let request = self.prepare_request(credential, key)?;

        let response = self
            .http
            .execute(request)
            .await
            .map_err(TokenRequestError::Transport)?;
        let status = response.status().as_u16();

        debug!("Reading response body");
        let body = response
            .bytes()
            .await
            .map_err(TokenRequestError::ResponseRead)?;

        debug!("Parsing response body");
        let parsed: TokenResponse =
            serde_json::from_slice(&body).map_err(TokenRequestError::ResponseParse)?;
        if !parsed.is_valid() {
            return Err(TokenRequestError::InvalidTokenResponse { status });
        }

        info!(
            token_type = %parsed.token_type,
            expires_in = parsed.expires_in,
            "Received new token"
        );

        Ok(BearerToken {
            access_token: parsed.access_token,
            token_type: parsed.token_type,
            expiry: Utc::now() + Duration::seconds(parsed.expires_in),
        })
    }
}
