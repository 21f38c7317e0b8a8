//! Compute data gateway
//!
//! Collectors read instances and regions through [`ComputeGateway`];
//! [`ComputeService`] implements it over the Compute Engine REST API.

mod rest;

pub use rest::{ComputeService, COMPUTE_BASE_URL, INSTANCES_PAGE_SIZE};

use crate::auth::TokenSourceError;
use crate::models::{Instance, Region};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("could not authorize request: {0}")]
    Auth(#[from] TokenSourceError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid compute endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("instances listing returned page token {0:?} twice")]
    RepeatedPageToken(String),
}

/// Read access to compute resources
#[async_trait]
pub trait ComputeGateway: Send + Sync {
    /// All instances of `project` in `zone`, across every page
    async fn list_instances(&self, project: &str, zone: &str) -> Result<Vec<Instance>, ComputeError>;

    async fn get_region(&self, project: &str, region: &str) -> Result<Region, ComputeError>;
}
