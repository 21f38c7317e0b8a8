//! Exporter self-metrics and structured lifecycle logging

use chrono::{DateTime, Utc};
use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, Registry};
use tracing::{info, warn};

/// Buckets for the refresh duration, in seconds
const REFRESH_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Metrics describing the refresh cycles themselves
///
/// Created unregistered; `register` adds them to an explicit registry.
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ExporterMetrics {
    last_refresh_timestamp_seconds: Gauge,
    refresh_errors_total: IntCounter,
    refresh_duration_seconds: Histogram,
}

impl Default for ExporterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ExporterMetrics {
    pub fn new() -> Self {
        Self {
            last_refresh_timestamp_seconds: Gauge::new(
                "gcp_exporter_last_data_refresh_timestamp_seconds",
                "Time when last data refresh from GCP was done",
            )
            .expect("Failed to create last_data_refresh_timestamp_seconds"),

            refresh_errors_total: IntCounter::new(
                "gcp_exporter_data_refresh_errors_total",
                "Total number of errors raised during data refresh from GCP",
            )
            .expect("Failed to create data_refresh_errors_total"),

            refresh_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "gcp_exporter_data_refresh_duration_seconds",
                    "Time spent refreshing data from GCP",
                )
                .buckets(REFRESH_BUCKETS.to_vec()),
            )
            .expect("Failed to create data_refresh_duration_seconds"),
        }
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.last_refresh_timestamp_seconds.clone()))?;
        registry.register(Box::new(self.refresh_errors_total.clone()))?;
        registry.register(Box::new(self.refresh_duration_seconds.clone()))?;
        Ok(())
    }

    pub fn set_last_refresh(&self, at: DateTime<Utc>) {
        self.last_refresh_timestamp_seconds
            .set(at.timestamp_millis() as f64 / 1000.0);
    }

    pub fn inc_refresh_errors(&self) {
        self.refresh_errors_total.inc();
    }

    pub fn observe_refresh_duration(&self, duration_secs: f64) {
        self.refresh_duration_seconds.observe(duration_secs);
    }

    pub fn last_refresh_timestamp(&self) -> f64 {
        self.last_refresh_timestamp_seconds.get()
    }

    pub fn refresh_errors(&self) -> u64 {
        self.refresh_errors_total.get()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refresh_duration_seconds.get_sample_count()
    }
}

/// Structured logger for exporter lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    exporter: String,
}

impl StructuredLogger {
    pub fn new(exporter: impl Into<String>) -> Self {
        Self {
            exporter: exporter.into(),
        }
    }

    pub fn log_startup(&self, version: &str, listen: &str, interval_secs: u64) {
        info!(
            event = "exporter_started",
            exporter = %self.exporter,
            version = %version,
            listen = %listen,
            interval_secs = interval_secs,
            "Exporter started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            exporter = %self.exporter,
            reason = %reason,
            "Exporter shutting down"
        );
    }

    pub fn log_collector_enabled(&self, collector: &str) {
        info!(
            event = "collector_enabled",
            exporter = %self.exporter,
            collector = %collector,
            "Enabling collector"
        );
    }

    pub fn log_data_refresh(&self, collectors: usize, errors: usize, elapsed_ms: u128) {
        if errors == 0 {
            info!(
                event = "data_refresh",
                exporter = %self.exporter,
                collectors = collectors,
                errors = errors,
                elapsed_ms = elapsed_ms as u64,
                "Data refresh from GCP complete"
            );
        } else {
            warn!(
                event = "data_refresh",
                exporter = %self.exporter,
                collectors = collectors,
                errors = errors,
                elapsed_ms = elapsed_ms as u64,
                "Data refresh from GCP finished with errors"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn test_metrics_register_on_explicit_registry() {
        let registry = Registry::new();
        let metrics = ExporterMetrics::new();
        metrics.register(&registry).unwrap();

        metrics.inc_refresh_errors();
        metrics.observe_refresh_duration(0.3);
        metrics.set_last_refresh(Utc.timestamp_opt(1_700_000_000, 0).unwrap());

        let names: Vec<_> = registry
            .gather()
            .iter()
            .map(|mf| mf.get_name().to_string())
            .collect();
        assert!(names.contains(&"gcp_exporter_data_refresh_errors_total".to_string()));
        assert!(names.contains(&"gcp_exporter_data_refresh_duration_seconds".to_string()));
        assert!(names.contains(&"gcp_exporter_last_data_refresh_timestamp_seconds".to_string()));

        assert_eq!(metrics.refresh_errors(), 1);
        assert_eq!(metrics.refresh_count(), 1);
        assert_eq!(metrics.last_refresh_timestamp(), 1_700_000_000.0);
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        let metrics = ExporterMetrics::new();
        metrics.register(&registry).unwrap();
        assert!(metrics.register(&registry).is_err());
    }

    #[test]
    fn test_clones_share_values() {
        let metrics = ExporterMetrics::new();
        let clone = metrics.clone();
        clone.inc_refresh_errors();
        assert_eq!(metrics.refresh_errors(), 1);
    }

    /// Writer collecting everything the subscriber formats
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn events(&self) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(logs.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        logs.events()
    }

    #[test]
    fn test_structured_logger_events() {
        let logger = StructuredLogger::new("gcp-exporter");
        let events = capture(|| {
            logger.log_collector_enabled("instances-collector");
            logger.log_data_refresh(2, 0, 12);
            logger.log_data_refresh(2, 1, 15);
        });

        assert_eq!(events.len(), 3);

        let enabled = &events[0];
        assert_eq!(enabled["level"], "INFO");
        assert_eq!(enabled["fields"]["event"], "collector_enabled");
        assert_eq!(enabled["fields"]["exporter"], "gcp-exporter");
        assert_eq!(enabled["fields"]["collector"], "instances-collector");

        let clean = &events[1];
        assert_eq!(clean["level"], "INFO");
        assert_eq!(clean["fields"]["event"], "data_refresh");
        assert_eq!(clean["fields"]["errors"], 0);

        let failed = &events[2];
        assert_eq!(failed["level"], "WARN");
        assert_eq!(failed["fields"]["event"], "data_refresh");
        assert_eq!(failed["fields"]["collectors"], 2);
        assert_eq!(failed["fields"]["errors"], 1);
        assert_eq!(failed["fields"]["elapsed_ms"], 15);
    }
}
