//! Registry of available collectors

use super::{
    ConfigOption, InstancesCollector, RegionsCollector, ResourceCollector, PROJECT_OPTION,
    ZONE_OPTION,
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Collectors keyed by name, plus options shared between them
///
/// Filled once at startup; a later registration under an existing name
/// replaces the earlier one.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: DashMap<String, Arc<dyn ResourceCollector>>,
    shared_options: Vec<ConfigOption>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, collector: Arc<dyn ResourceCollector>) {
        let name = collector.name().to_string();
        debug!(collector = %name, "Registering collector");
        self.collectors.insert(name, collector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ResourceCollector>> {
        self.collectors.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Collector name -> name of its enable toggle
    pub fn enable_flag_names(&self) -> BTreeMap<String, String> {
        self.collectors
            .iter()
            .map(|entry| (entry.key().clone(), enable_flag_name(entry.key())))
            .collect()
    }

    /// Add options that are not tied to a single collector
    pub fn add_options(&mut self, options: impl IntoIterator<Item = ConfigOption>) {
        self.shared_options.extend(options);
    }

    /// The whole configuration surface: shared options first, then per
    /// collector (sorted by name) its enable toggle followed by its own options
    pub fn options(&self) -> Vec<ConfigOption> {
        let mut options = self.shared_options.clone();

        let mut names: Vec<String> = self.collectors.iter().map(|e| e.key().clone()).collect();
        names.sort();

        for name in names {
            let Some(collector) = self.get(&name) else {
                continue;
            };
            options.push(ConfigOption::toggle(
                &enable_flag_name(&name),
                &format!("Enables {name} collector"),
            ));
            options.extend(collector.options());
        }

        options
    }
}

fn enable_flag_name(name: &str) -> String {
    format!("{name}-enable")
}

/// Registry holding the compute collectors and their shared selectors
pub fn default_registry() -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();
    registry.add_options([
        ConfigOption::list(PROJECT_OPTION, "Query resources that belong to selected project"),
        ConfigOption::list(ZONE_OPTION, "Query resources that belong to selected zone"),
    ]);
    registry.register(Arc::new(InstancesCollector::new()));
    registry.register(Arc::new(RegionsCollector::new()));
    registry
}
