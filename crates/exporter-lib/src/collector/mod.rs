//! Resource collectors
//!
//! Each collector polls the compute gateway on refresh, aggregates what it
//! finds into a permutation-keyed snapshot and turns the latest snapshot
//! into gauges on scrape.

mod instances;
mod provider;
mod regions;
mod registry;


pub use instances::{InstancesCollector, InstancesPermutation, INSTANCES_COLLECTOR_NAME};
pub use provider::{Provider, ProviderError};
pub use regions::{derive_regions, QuotaPermutation, QuotaValues, RegionsCollector, REGIONS_COLLECTOR_NAME};
pub use registry::{default_registry, CollectorRegistry};

use crate::auth::AuthorizedClient;
use crate::compute::{ComputeError, ComputeGateway, ComputeService};
use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub use async_trait::async_trait;

/// Option shared by the compute collectors: projects to query
pub const PROJECT_OPTION: &str = "project";

/// Option shared by the compute collectors: zones to query
pub const ZONE_OPTION: &str = "zone";

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{0} not initialized")]
    NotInitialized(&'static str),

    #[error("{0} compute service is not initialized")]
    ServiceUnavailable(&'static str),

    #[error("error while initializing compute service: {0}")]
    GatewayInit(#[source] ComputeError),

    #[error("error while requesting {what} data: {source}")]
    DataFetch {
        what: &'static str,
        #[source]
        source: ComputeError,
    },
}

/// Kind of value a configuration option takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Boolean switch, off unless given
    Toggle,
    /// Repeatable or comma separated list of strings
    List,
}

/// A configurable setting exposed on the command line and in the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigOption {
    pub name: String,
    pub env: String,
    pub help: String,
    pub kind: OptionKind,
}

impl ConfigOption {
    pub fn list(name: &str, help: &str) -> Self {
        Self {
            name: name.to_string(),
            env: format!("GCP_EXPORTER_{}", env_suffix(name)),
            help: help.to_string(),
            kind: OptionKind::List,
        }
    }

    pub fn toggle(name: &str, help: &str) -> Self {
        Self {
            name: name.to_string(),
            env: env_suffix(name),
            help: help.to_string(),
            kind: OptionKind::Toggle,
        }
    }
}

/// `match-tag` -> `MATCH_TAG`
fn env_suffix(name: &str) -> String {
    name.to_uppercase().replace('-', "_")
}

/// Values given for the configuration surface, keyed by option name
#[derive(Debug, Clone, Default)]
pub struct OptionValues {
    lists: HashMap<String, Vec<String>>,
    toggles: HashSet<String>,
}

impl OptionValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_list<I, S>(&mut self, name: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lists
            .insert(name.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn enable(&mut self, name: &str) -> &mut Self {
        self.toggles.insert(name.to_string());
        self
    }

    /// Values of a list option; empty when it was not given
    pub fn list(&self, name: &str) -> &[String] {
        self.lists.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.toggles.contains(name)
    }
}

/// A source of resource metrics driven by the provider
#[async_trait]
pub trait ResourceCollector: Send + Sync {
    /// Registry key, also the stem of the collector's enable toggle
    fn name(&self) -> &'static str;

    /// Options specific to this collector
    fn options(&self) -> Vec<ConfigOption> {
        Vec::new()
    }

    /// Apply option values before `init`
    fn configure(&self, _values: &OptionValues) {}

    /// Bind the collector to the compute API through `client`
    async fn init(&self, client: &AuthorizedClient) -> Result<(), CollectorError>;

    /// Refresh the snapshot. A failure keeps the previous snapshot.
    async fn get_data(&self) -> Result<(), CollectorError>;

    fn describe(&self) -> Vec<&Desc>;

    /// Metric families built from the current snapshot
    fn collect(&self) -> Vec<MetricFamily>;
}

#[derive(Default)]
struct BindingState {
    initialized: bool,
    gateway: Option<Arc<dyn ComputeGateway>>,
}

/// One-way Uninitialized -> Initialized switch holding the gateway handle
#[derive(Default)]
pub struct GatewayBinding {
    state: RwLock<BindingState>,
}

impl GatewayBinding {
    /// Build a REST gateway from `client` and bind it
    pub async fn init(&self, client: &AuthorizedClient) -> Result<(), CollectorError> {
        let service = ComputeService::new(client.clone()).map_err(CollectorError::GatewayInit)?;
        self.bind(Some(Arc::new(service))).await;
        Ok(())
    }

    pub async fn bind(&self, gateway: Option<Arc<dyn ComputeGateway>>) {
        let mut state = self.state.write().await;
        state.gateway = gateway;
        state.initialized = true;
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.initialized
    }

    /// The bound gateway, or the error explaining why there is none
    pub async fn gateway(&self, collector: &'static str) -> Result<Arc<dyn ComputeGateway>, CollectorError> {
        let state = self.state.read().await;
        if !state.initialized {
            return Err(CollectorError::NotInitialized(collector));
        }
        state
            .gateway
            .clone()
            .ok_or(CollectorError::ServiceUnavailable(collector))
    }
}
