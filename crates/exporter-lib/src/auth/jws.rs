//! JWT assertion encoding
//!
//! Builds the compact `header.claims.signature` form signed with RS256.

use base64::prelude::{Engine as _, BASE64_URL_SAFE_NO_PAD};
use rsa::pkcs1v15::SigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while producing a signed assertion
#[derive(Debug, Error)]
pub enum JwsError {
    #[error("could not serialize JWT segment: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("could not sign JWT: {0}")]
    Signing(#[from] rsa::signature::Error),
}

/// The header that describes how the assertion was signed.
#[derive(Debug, Clone, Serialize)]
pub struct JwsHeader {
    pub alg: &'static str,
    pub typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl JwsHeader {
    /// RS256 header, optionally naming the signing key
    pub fn rs256(kid: Option<String>) -> Self {
        Self {
            alg: "RS256",
            typ: "JWT",
            kid,
        }
    }
}

/// Claim set of a service account assertion. Timestamps are unix seconds.
#[derive(Debug, Clone, Serialize)]
pub struct JwsClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, JwsError> {
    let json = serde_json::to_vec(value)?;
    Ok(BASE64_URL_SAFE_NO_PAD.encode(json))
}

/// Turns a header and claim set into a signed assertion string
pub trait AssertionEncoder: Send + Sync {
    fn encode(
        &self,
        header: &JwsHeader,
        claims: &JwsClaims,
        key: &RsaPrivateKey,
    ) -> Result<String, JwsError>;
}

/// RSASSA-PKCS1-v1_5 with SHA-256
#[derive(Debug, Clone, Copy, Default)]
pub struct Rs256Encoder;

impl AssertionEncoder for Rs256Encoder {
    fn encode(
        &self,
        header: &JwsHeader,
        claims: &JwsClaims,
        key: &RsaPrivateKey,
    ) -> Result<String, JwsError> {
        let signing_input = format!("{}.{}", encode_segment(header)?, encode_segment(claims)?);

        let signing_key = SigningKey::<Sha256>::new(key.clone());
        let signature = signing_key.try_sign(signing_input.as_bytes())?;

        Ok(format!(
            "{}.{}",
            signing_input,
            BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}
