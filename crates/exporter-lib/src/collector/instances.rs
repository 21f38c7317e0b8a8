//! Instance counts per project, zone, tag set and machine type

use super::{
    CollectorError, ConfigOption, GatewayBinding, OptionValues, ResourceCollector, PROJECT_OPTION,
    ZONE_OPTION,
};
use crate::auth::AuthorizedClient;
use crate::compute::ComputeGateway;
use crate::models::Instance;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const INSTANCES_COLLECTOR_NAME: &str = "instances-collector";

const MATCH_TAG_OPTION: &str = "match-tag";

const INSTANCES_COUNT: &str = "gcp_exporter_instances_count";
const INSTANCES_COUNT_HELP: &str = "Current number of instances";
const INSTANCES_LABELS: &[&str] = &["project", "zone", "tags", "machine_type"];

/// Aggregation key of the instance counts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstancesPermutation {
    pub project: String,
    pub zone: String,
    /// Tags joined with `,` in the order the API returned them
    pub tags: String,
    pub machine_type: String,
}

type InstanceCounts = HashMap<InstancesPermutation, u64>;

#[derive(Debug, Clone, Default)]
struct Selection {
    projects: Vec<String>,
    zones: Vec<String>,
    match_tags: Vec<String>,
}

/// Counts instances over every configured project and zone
pub struct InstancesCollector {
    selection: ArcSwap<Selection>,
    binding: GatewayBinding,
    counts: ArcSwap<InstanceCounts>,
    template: GaugeVec,
}

impl Default for InstancesCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl InstancesCollector {
    pub fn new() -> Self {
        Self {
            selection: ArcSwap::from_pointee(Selection::default()),
            binding: GatewayBinding::default(),
            counts: ArcSwap::from_pointee(InstanceCounts::new()),
            template: instances_gauge(),
        }
    }

    /// Set the selection directly
    pub fn with_selection(
        self,
        projects: Vec<String>,
        zones: Vec<String>,
        match_tags: Vec<String>,
    ) -> Self {
        self.selection.store(Arc::new(Selection {
            projects,
            zones,
            match_tags,
        }));
        self
    }

    /// Bind an already constructed gateway
    pub async fn init_with_gateway(&self, gateway: Arc<dyn ComputeGateway>) {
        self.binding.bind(Some(gateway)).await;
        self.log_registered();
    }

    /// Current counts
    pub fn snapshot(&self) -> Arc<HashMap<InstancesPermutation, u64>> {
        self.counts.load_full()
    }

    fn log_registered(&self) {
        let selection = self.selection.load();
        info!(
            collector = INSTANCES_COLLECTOR_NAME,
            projects = %selection.projects.join(","),
            zones = %selection.zones.join(","),
            match_tags = %selection.match_tags.join(","),
            "Registered collector"
        );
    }

    #[cfg(test)]
    pub(crate) fn binding(&self) -> &GatewayBinding {
        &self.binding
    }
}

/// Instances carrying at least one of `match_tags`; everything when none are given
pub fn filter_by_tags<'a>(instances: &'a [Instance], match_tags: &[String]) -> Vec<&'a Instance> {
    if match_tags.is_empty() {
        return instances.iter().collect();
    }

    instances
        .iter()
        .filter(|instance| {
            instance
                .tag_items()
                .iter()
                .any(|tag| match_tags.contains(tag))
        })
        .collect()
}

fn add_instances(counts: &mut InstanceCounts, project: &str, zone: &str, instances: &[&Instance]) {
    for instance in instances {
        let permutation = InstancesPermutation {
            project: project.to_string(),
            zone: zone.to_string(),
            tags: instance.tag_items().join(","),
            machine_type: instance.machine_type.clone(),
        };
        *counts.entry(permutation).or_insert(0) += 1;
    }
}

fn instances_gauge() -> GaugeVec {
    GaugeVec::new(Opts::new(INSTANCES_COUNT, INSTANCES_COUNT_HELP), INSTANCES_LABELS)
        .expect("Failed to create instances_count")
}

#[async_trait]
impl ResourceCollector for InstancesCollector {
    fn name(&self) -> &'static str {
        INSTANCES_COLLECTOR_NAME
    }

    fn options(&self) -> Vec<ConfigOption> {
        vec![ConfigOption::list(
            MATCH_TAG_OPTION,
            "Count instances that are matching selected tag",
        )]
    }

    fn configure(&self, values: &OptionValues) {
        self.selection.store(Arc::new(Selection {
            projects: values.list(PROJECT_OPTION).to_vec(),
            zones: values.list(ZONE_OPTION).to_vec(),
            match_tags: values.list(MATCH_TAG_OPTION).to_vec(),
        }));
    }

    async fn init(&self, client: &AuthorizedClient) -> Result<(), CollectorError> {
        self.binding.init(client).await?;
        self.log_registered();
        Ok(())
    }

    async fn get_data(&self) -> Result<(), CollectorError> {
        let gateway = self.binding.gateway(INSTANCES_COLLECTOR_NAME).await?;
        let selection = self.selection.load_full();

        let mut counts = InstanceCounts::new();
        for project in &selection.projects {
            for zone in &selection.zones {
                debug!(project = %project, zone = %zone, "Requesting instances");

                let instances = gateway
                    .list_instances(project, zone)
                    .await
                    .map_err(|source| CollectorError::DataFetch {
                        what: "instances",
                        source,
                    })?;
                debug!(count = instances.len(), "Found instances");

                let selected = filter_by_tags(&instances, &selection.match_tags);
                add_instances(&mut counts, project, zone, &selected);
            }
        }

        self.counts.store(Arc::new(counts));
        Ok(())
    }

    fn describe(&self) -> Vec<&Desc> {
        self.template.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let counts = self.counts.load();
        let gauge = instances_gauge();
        for (permutation, count) in counts.iter() {
            gauge
                .with_label_values(&[
                    permutation.project.as_str(),
                    permutation.zone.as_str(),
                    permutation.tags.as_str(),
                    permutation.machine_type.as_str(),
                ])
                .set(*count as f64);
        }
        gauge.collect()
    }
}
