//! Service account credential file

use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Value of the `type` field identifying a service account key file
pub const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// Token URI used when the credential file does not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Errors raised while locating, reading or parsing a credential file
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("service account file {} doesn't exist: {source}", .path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("service account file {} cannot be read, because of permission problems: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not read service account file: {0}")]
    FileRead(#[source] io::Error),

    #[error("could not parse service account JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("could not parse service account JSON: 'type' field is {found:?} (expected \"service_account\")")]
    UnexpectedType { found: String },

    #[error("could not parse service account JSON: required field {0:?} is empty")]
    MissingField(&'static str),
}

/// Parsed service account credential
///
/// Immutable once read; the private key stays encoded until the key parser
/// turns it into an RSA key for a single token request.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceAccountCredential {
    pub client_email: String,
    pub private_key_id: String,
    pub private_key: Vec<u8>,
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("private_key", &"[censored]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

/// On-disk layout of a service account key file (only the fields we use)
#[derive(Deserialize)]
struct ServiceAccountKeyFile {
    #[serde(rename = "type", default)]
    cred_type: String,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    private_key_id: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    token_uri: String,
}

impl ServiceAccountCredential {
    /// Read and parse the credential file at `path`
    pub async fn read(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading service account credentials");

        let contents = tokio::fs::read(path)
            .await
            .map_err(CredentialsError::FileRead)?;

        Self::from_json(&contents)
    }

    /// Parse credential JSON already loaded in memory
    pub fn from_json(contents: &[u8]) -> Result<Self, CredentialsError> {
        debug!("Parsing service account credentials");

        let file: ServiceAccountKeyFile =
            serde_json::from_slice(contents).map_err(CredentialsError::Parse)?;

        if file.cred_type != SERVICE_ACCOUNT_TYPE {
            return Err(CredentialsError::UnexpectedType {
                found: file.cred_type,
            });
        }
        if file.client_email.is_empty() {
            return Err(CredentialsError::MissingField("client_email"));
        }
        if file.private_key.is_empty() {
            return Err(CredentialsError::MissingField("private_key"));
        }

        let token_uri = if file.token_uri.is_empty() {
            DEFAULT_TOKEN_URI.to_string()
        } else {
            file.token_uri
        };

        Ok(Self {
            client_email: file.client_email,
            private_key_id: file.private_key_id,
            private_key: file.private_key.into_bytes(),
            token_uri,
        })
    }
}

/// Check that the credential file exists and is accessible.
///
/// Missing files and permission problems get their own errors so startup
/// diagnostics can tell them apart.
pub fn check_credentials_file(path: &Path) -> Result<(), CredentialsError> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(source) if source.kind() == io::ErrorKind::NotFound => Err(CredentialsError::NotFound {
            path: path.to_path_buf(),
            source,
        }),
        Err(source) if source.kind() == io::ErrorKind::PermissionDenied => {
            Err(CredentialsError::PermissionDenied {
                path: path.to_path_buf(),
                source,
            })
        }
        Err(source) => Err(CredentialsError::FileRead(source)),
    }
}
