//! Shared fixtures for auth tests

use super::credentials::ServiceAccountCredential;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::OnceLock;
use tempfile::NamedTempFile;

/// Process-wide RSA key; generation is slow so it happens once.
pub fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("failed to generate test key")
    })
}

pub fn test_key_pem() -> String {
    test_key()
        .to_pkcs8_pem(LineEnding::LF)
        .expect("failed to encode test key")
        .to_string()
}

/// Write `contents` as JSON to a temporary file
pub fn write_credentials_file(contents: &Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.to_string().as_bytes())
        .expect("failed to write temp file");
    file.flush().expect("failed to flush temp file");
    file
}

/// A complete credential file holding the test key
pub fn write_valid_credentials_file(client_email: &str) -> NamedTempFile {
    write_credentials_file(&json!({
        "type": "service_account",
        "project_id": "project",
        "private_key_id": "test-key-id",
        "private_key": test_key_pem(),
        "client_email": client_email,
        "token_uri": "https://oauth2.googleapis.com/token"
    }))
}

pub fn test_credential(client_email: &str) -> ServiceAccountCredential {
    ServiceAccountCredential {
        client_email: client_email.to_string(),
        private_key_id: "test-key-id".to_string(),
        private_key: test_key_pem().into_bytes(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
    }
}
