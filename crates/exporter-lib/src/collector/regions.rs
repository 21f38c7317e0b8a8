//! Quota usage and limits per project, region and quota metric

use super::{
    CollectorError, GatewayBinding, OptionValues, ResourceCollector, PROJECT_OPTION, ZONE_OPTION,
};
use crate::auth::AuthorizedClient;
use crate::compute::ComputeGateway;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const REGIONS_COLLECTOR_NAME: &str = "regions-collector";

const QUOTA_USAGE: &str = "gcp_exporter_region_quota_usage";
const QUOTA_USAGE_HELP: &str = "Current usage for regions quotas";
const QUOTA_LIMIT: &str = "gcp_exporter_region_quota_limit";
const QUOTA_LIMIT_HELP: &str = "Current limit for regions quotas";
const QUOTA_LABELS: &[&str] = &["project", "region", "quota"];

/// Aggregation key of the quota values
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuotaPermutation {
    pub project: String,
    pub region: String,
    pub quota: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaValues {
    pub usage: f64,
    pub limit: f64,
}

type QuotaSnapshot = HashMap<QuotaPermutation, QuotaValues>;

#[derive(Debug, Clone, Default)]
struct Selection {
    projects: Vec<String>,
    regions: Vec<String>,
}

/// `us-central1-a` -> `us-central1`; names without a one-letter suffix are kept
fn region_of_zone(zone: &str) -> &str {
    match zone.rsplit_once('-') {
        Some((region, suffix))
            if !region.is_empty()
                && suffix.len() == 1
                && suffix.chars().all(|c| c.is_ascii_alphabetic()) =>
        {
            region
        }
        _ => zone,
    }
}

/// Regions of `zones`, de-duplicated in first-seen order
pub fn derive_regions(zones: &[String]) -> Vec<String> {
    let mut regions: Vec<String> = Vec::with_capacity(zones.len());
    for zone in zones {
        let region = region_of_zone(zone);
        if !regions.iter().any(|r| r == region) {
            regions.push(region.to_string());
        }
    }
    regions
}

/// Reads region quotas over every configured project and derived region
pub struct RegionsCollector {
    selection: ArcSwap<Selection>,
    binding: GatewayBinding,
    quotas: ArcSwap<QuotaSnapshot>,
    usage_template: GaugeVec,
    limit_template: GaugeVec,
}

impl Default for RegionsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionsCollector {
    pub fn new() -> Self {
        Self {
            selection: ArcSwap::from_pointee(Selection::default()),
            binding: GatewayBinding::default(),
            quotas: ArcSwap::from_pointee(QuotaSnapshot::new()),
            usage_template: quota_gauge(QUOTA_USAGE, QUOTA_USAGE_HELP),
            limit_template: quota_gauge(QUOTA_LIMIT, QUOTA_LIMIT_HELP),
        }
    }

    /// Set projects and zones directly; regions are derived from the zones
    pub fn with_selection(self, projects: Vec<String>, zones: Vec<String>) -> Self {
        self.selection.store(Arc::new(Selection {
            projects,
            regions: derive_regions(&zones),
        }));
        self
    }

    pub async fn init_with_gateway(&self, gateway: Arc<dyn ComputeGateway>) {
        self.binding.bind(Some(gateway)).await;
        self.log_registered();
    }

    pub fn regions(&self) -> Vec<String> {
        self.selection.load().regions.clone()
    }

    pub fn snapshot(&self) -> Arc<HashMap<QuotaPermutation, QuotaValues>> {
        self.quotas.load_full()
    }

    fn log_registered(&self) {
        let selection = self.selection.load();
        info!(
            collector = REGIONS_COLLECTOR_NAME,
            projects = %selection.projects.join(","),
            regions = %selection.regions.join(","),
            "Registered collector"
        );
    }
}

fn quota_gauge(name: &str, help: &str) -> GaugeVec {
    GaugeVec::new(Opts::new(name, help), QUOTA_LABELS).expect("Failed to create quota gauge")
}

#[async_trait]
impl ResourceCollector for RegionsCollector {
    fn name(&self) -> &'static str {
        REGIONS_COLLECTOR_NAME
    }

    fn configure(&self, values: &OptionValues) {
        self.selection.store(Arc::new(Selection {
            projects: values.list(PROJECT_OPTION).to_vec(),
            regions: derive_regions(values.list(ZONE_OPTION)),
        }));
    }

    async fn init(&self, client: &AuthorizedClient) -> Result<(), CollectorError> {
        self.binding.init(client).await?;
        self.log_registered();
        Ok(())
    }

    async fn get_data(&self) -> Result<(), CollectorError> {
        let gateway = self.binding.gateway(REGIONS_COLLECTOR_NAME).await?;
        let selection = self.selection.load_full();

        let mut quotas = QuotaSnapshot::new();
        for project in &selection.projects {
            for region in &selection.regions {
                debug!(project = %project, region = %region, "Requesting region");

                let data = gateway.get_region(project, region).await.map_err(|source| {
                    CollectorError::DataFetch {
                        what: "region",
                        source,
                    }
                })?;

                for quota in data.quotas {
                    quotas.insert(
                        QuotaPermutation {
                            project: project.clone(),
                            region: region.clone(),
                            quota: quota.metric,
                        },
                        QuotaValues {
                            usage: quota.usage,
                            limit: quota.limit,
                        },
                    );
                }
            }
        }

        self.quotas.store(Arc::new(quotas));
        Ok(())
    }

    fn describe(&self) -> Vec<&Desc> {
        let mut descs = self.usage_template.desc();
        descs.extend(self.limit_template.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let quotas = self.quotas.load();
        let usage = quota_gauge(QUOTA_USAGE, QUOTA_USAGE_HELP);
        let limit = quota_gauge(QUOTA_LIMIT, QUOTA_LIMIT_HELP);

        for (permutation, values) in quotas.iter() {
            let labels = [
                permutation.project.as_str(),
                permutation.region.as_str(),
                permutation.quota.as_str(),
            ];
            usage.with_label_values(&labels).set(values.usage);
            limit.with_label_values(&labels).set(values.limit);
        }

        let mut families = usage.collect();
        families.extend(limit.collect());
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zones(names: &[&str]) -> Vec<String> {
        names.iter().map(|z| z.to_string()).collect()
    }

    #[test]
    fn test_region_of_zone() {
        assert_eq!(region_of_zone("us-central1-a"), "us-central1");
        assert_eq!(region_of_zone("europe-west4-c"), "europe-west4");
        assert_eq!(region_of_zone("us-central1"), "us-central1");
        assert_eq!(region_of_zone("zone"), "zone");
        assert_eq!(region_of_zone("-a"), "-a");
    }

    #[test]
    fn test_derive_regions_dedupes_in_order() {
        assert_eq!(derive_regions(&zones(&["us-central1-a"])), ["us-central1"]);
        assert_eq!(
            derive_regions(&zones(&["us-central1-a", "us-central1-b"])),
            ["us-central1"]
        );
        assert_eq!(
            derive_regions(&zones(&["europe-west1-b", "us-east1-c", "europe-west1-d"])),
            ["europe-west1", "us-east1"]
        );
        assert!(derive_regions(&[]).is_empty());
    }

    #[test]
    fn test_configure_derives_regions() {
        let collector = RegionsCollector::new();
        let mut values = OptionValues::new();
        values
            .set_list(PROJECT_OPTION, ["p"])
            .set_list(ZONE_OPTION, ["us-central1-a", "us-central1-f", "asia-east1-a"]);

        collector.configure(&values);
        assert_eq!(collector.regions(), ["us-central1", "asia-east1"]);
    }

    #[test]
    fn test_describe_has_usage_and_limit() {
        let collector = RegionsCollector::new();
        let names: Vec<_> = collector.describe().iter().map(|d| d.fq_name.clone()).collect();
        assert_eq!(names, [QUOTA_USAGE, QUOTA_LIMIT]);
    }
}
