//! Service account authentication
//!
//! A credential file is read, its key parsed and a signed JWT assertion is
//! exchanged for a bearer token, which [`TokenSource`] caches until expiry.

pub mod credentials;
pub mod jws;
pub mod key;
pub mod requester;
pub mod source;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use credentials::{check_credentials_file, CredentialsError, ServiceAccountCredential};
pub use jws::{AssertionEncoder, JwsClaims, JwsError, JwsHeader, Rs256Encoder};
pub use key::{parse_private_key, KeyError};
pub use requester::{TokenExchange, TokenRequestError, TokenRequester, TOKEN_REQUEST_URL};
pub use source::{AccessTokenProvider, TokenSource, TokenSourceError};
pub use transport::{AuthorizedClient, ClientError};

/// An OAuth2 access token and the moment it stops being valid
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BearerToken {
    pub access_token: String,
    pub token_type: String,
    pub expiry: DateTime<Utc>,
}

impl BearerToken {
    /// Usable while the current time is strictly before `expiry`
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}
