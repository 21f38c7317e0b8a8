//! GCP exporter library
//!
//! This crate provides the core functionality for:
//! - Service account token acquisition and caching
//! - Compute Engine data access
//! - Resource collectors aggregating instances and quotas into gauges
//! - The periodic refresh loop
//! - Self-metrics, structured logging and version info

pub mod auth;
pub mod collector;
pub mod compute;
pub mod exporter;
pub mod models;
pub mod observability;
pub mod version;

pub use auth::{AuthorizedClient, BearerToken, TokenSource};
pub use collector::{default_registry, CollectorRegistry, OptionValues, Provider};
pub use exporter::RefreshLoop;
pub use models::*;
pub use observability::{ExporterMetrics, StructuredLogger};
pub use version::VersionInfo;
