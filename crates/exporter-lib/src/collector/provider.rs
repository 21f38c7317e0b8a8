//! The set of enabled collectors, refreshed and scraped together

use super::{CollectorError, CollectorRegistry, OptionValues, ResourceCollector};
use crate::auth::AuthorizedClient;
use crate::observability::{ExporterMetrics, StructuredLogger};
use chrono::Utc;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("error while initializing collector {name}: {source}")]
    Init {
        name: String,
        #[source]
        source: CollectorError,
    },
}

/// Enabled collectors behind a cheap-to-clone handle
///
/// Registered with a `prometheus::Registry` as a single collector that
/// forwards to every enabled resource collector.
#[derive(Clone)]
pub struct Provider {
    inner: Arc<Inner>,
}

struct Inner {
    collectors: Vec<Arc<dyn ResourceCollector>>,
    metrics: ExporterMetrics,
    logger: StructuredLogger,
}

impl Provider {
    /// Enable, configure and initialise every collector whose toggle is set
    pub async fn initialize(
        client: &AuthorizedClient,
        registry: &CollectorRegistry,
        values: &OptionValues,
        metrics: ExporterMetrics,
        logger: &StructuredLogger,
    ) -> Result<Self, ProviderError> {
        let mut collectors = Vec::new();

        for (name, flag) in registry.enable_flag_names() {
            if !values.is_enabled(&flag) {
                continue;
            }
            let Some(collector) = registry.get(&name) else {
                continue;
            };

            logger.log_collector_enabled(&name);
            collector.configure(values);
            collector
                .init(client)
                .await
                .map_err(|source| ProviderError::Init {
                    name: name.clone(),
                    source,
                })?;
            collectors.push(collector);
        }

        if collectors.is_empty() {
            info!("No collectors enabled");
        }

        Ok(Self::build(collectors, metrics, logger.clone()))
    }

    /// Provider over collectors that are already initialised
    pub fn with_collectors(
        collectors: Vec<Arc<dyn ResourceCollector>>,
        metrics: ExporterMetrics,
    ) -> Self {
        Self::build(collectors, metrics, StructuredLogger::new("gcp-exporter"))
    }

    fn build(
        collectors: Vec<Arc<dyn ResourceCollector>>,
        metrics: ExporterMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                collectors,
                metrics,
                logger,
            }),
        }
    }

    pub fn collector_names(&self) -> Vec<&'static str> {
        self.inner.collectors.iter().map(|c| c.name()).collect()
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.inner.metrics
    }

    /// Refresh every collector. Failures are logged and counted; the
    /// number of failed collectors is returned.
    pub async fn get_data(&self) -> usize {
        info!("Getting data from GCP");
        let start = Instant::now();
        let mut errors = 0;

        for collector in &self.inner.collectors {
            if let Err(e) = collector.get_data().await {
                error!(
                    collector = collector.name(),
                    error = %e,
                    "Error while getting data from GCP"
                );
                self.inner.metrics.inc_refresh_errors();
                errors += 1;
            }
        }

        let elapsed = start.elapsed();
        self.inner
            .metrics
            .observe_refresh_duration(elapsed.as_secs_f64());
        self.inner.metrics.set_last_refresh(Utc::now());
        self.inner
            .logger
            .log_data_refresh(self.inner.collectors.len(), errors, elapsed.as_millis());

        errors
    }
}

impl Collector for Provider {
    fn desc(&self) -> Vec<&Desc> {
        self.inner
            .collectors
            .iter()
            .flat_map(|c| c.describe())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.inner
            .collectors
            .iter()
            .flat_map(|c| c.collect())
            .collect()
    }
}
