//! Private key decoding
//!
//! Accepts PEM-armored or raw DER input holding a PKCS#8 or PKCS#1 RSA key.

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::PrivateKeyInfo;
use rsa::RsaPrivateKey;
use rustls_pemfile::Item;
use thiserror::Error;
use tracing::debug;

/// Errors raised while decoding a private key
#[derive(Debug, Error)]
pub enum KeyError {
    /// Neither PKCS#8 nor PKCS#1 decoding succeeded
    #[error("private key should be a PEM or plain PKCS1 or PKCS8; parse error: {0}")]
    Format(String),

    /// The key decoded, but it is not an RSA key
    #[error("private key is invalid: unsupported key algorithm {0}")]
    UnsupportedType(String),
}

/// Decode `encoded` into an RSA private key.
///
/// PEM armor is stripped when present; otherwise the input is taken as DER.
/// PKCS#8 is tried first and PKCS#1 is the fallback.
pub fn parse_private_key(encoded: &[u8]) -> Result<RsaPrivateKey, KeyError> {
    debug!("Parsing private key");

    let der = pem_contents(encoded).unwrap_or_else(|| encoded.to_vec());

    match PrivateKeyInfo::try_from(der.as_slice()) {
        Ok(info) => {
            if info.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
                return Err(KeyError::UnsupportedType(info.algorithm.oid.to_string()));
            }
            RsaPrivateKey::try_from(info).map_err(|e| KeyError::Format(e.to_string()))
        }
        Err(pkcs8_err) => RsaPrivateKey::from_pkcs1_der(&der).map_err(|pkcs1_err| {
            KeyError::Format(format!("pkcs8: {pkcs8_err}; pkcs1: {pkcs1_err}"))
        }),
    }
}

/// Inner DER bytes of the first PEM key block, if the input is PEM-armored.
fn pem_contents(encoded: &[u8]) -> Option<Vec<u8>> {
    let mut reader = encoded;
    match rustls_pemfile::read_one(&mut reader) {
        Ok(Some(Item::PKCS8Key(der))) | Ok(Some(Item::RSAKey(der))) | Ok(Some(Item::ECKey(der))) => {
            Some(der)
        }
        _ => None,
    }
}
