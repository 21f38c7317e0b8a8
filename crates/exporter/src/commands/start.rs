//! `start`: run the exporter service until a signal arrives

use crate::api::MetricsServer;
use crate::config::{ConfigOverrides, ExporterConfig};
use anyhow::{anyhow, Context, Result};
use clap::Args;
use exporter_lib::{
    collector::{CollectorRegistry, OptionValues, Provider},
    exporter::RefreshLoop,
    observability::{ExporterMetrics, StructuredLogger},
    AuthorizedClient, VersionInfo,
};
use prometheus::Registry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// Listen address of the metrics server (e.g. ":9393"); empty disables it
    #[arg(long, env = "GCP_EXPORTER_LISTEN")]
    pub listen: Option<String>,

    /// Seconds between data refreshes from GCP [default: 60]
    #[arg(long, env = "GCP_EXPORTER_INTERVAL")]
    pub interval: Option<u64>,

    /// Path to the service account JSON file [default: ~/.google-service-account.json]
    #[arg(long, env = "GCP_EXPORTER_SERVICE_ACCOUNT_FILE")]
    pub service_account_file: Option<PathBuf>,

    /// Settings file providing any of listen, interval and service_account_file
    #[arg(long, env = "GCP_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,
}

impl StartArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            file: self.config.clone(),
            listen: self.listen.clone(),
            interval: self.interval,
            service_account_file: self.service_account_file.clone(),
        }
    }
}

/// Startup steps, run in order; the first failure aborts startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartStep {
    RegisterSignalHandler,
    PrepareClient,
    PrepareProvider,
    StartMetricsServer,
    StartExporterService,
}

impl StartStep {
    const ALL: [StartStep; 5] = [
        StartStep::RegisterSignalHandler,
        StartStep::PrepareClient,
        StartStep::PrepareProvider,
        StartStep::StartMetricsServer,
        StartStep::StartExporterService,
    ];

    fn label(self) -> &'static str {
        match self {
            StartStep::RegisterSignalHandler => "could not register signal handler",
            StartStep::PrepareClient => "could not prepare GCP client",
            StartStep::PrepareProvider => "could not prepare collectors provider",
            StartStep::StartMetricsServer => "could not start metrics server",
            StartStep::StartExporterService => "could not start exporter service",
        }
    }
}

struct StartCommand {
    config: ExporterConfig,
    values: OptionValues,
    registry: CollectorRegistry,
    version: VersionInfo,
    logger: StructuredLogger,
    metrics_registry: Registry,

    shutdown: broadcast::Sender<()>,
    server_shutdown: Option<broadcast::Receiver<()>>,
    exporter_shutdown: Option<broadcast::Receiver<()>>,

    client: Option<AuthorizedClient>,
    provider: Option<Provider>,
    server: Option<JoinHandle<Result<()>>>,
    exporter: Option<JoinHandle<()>>,
}

/// Run the exporter service
pub async fn run(
    args: StartArgs,
    values: OptionValues,
    registry: CollectorRegistry,
    version: VersionInfo,
) -> Result<()> {
    let config = ExporterConfig::load(&args.overrides())?;
    debug!(?config, "Exporter configured");

    let (shutdown, _) = broadcast::channel(1);
    let mut command = StartCommand {
        config,
        values,
        registry,
        logger: StructuredLogger::new(&version.name),
        version,
        metrics_registry: Registry::new(),
        shutdown,
        server_shutdown: None,
        exporter_shutdown: None,
        client: None,
        provider: None,
        server: None,
        exporter: None,
    };

    for step in StartStep::ALL {
        debug!(step = ?step, "Running startup step");
        command.run_step(step).await.context(step.label())?;
    }

    command.logger.log_startup(
        &command.version.short_line(),
        &command.config.listen,
        command.config.interval,
    );

    command.wait().await
}

impl StartCommand {
    async fn run_step(&mut self, step: StartStep) -> Result<()> {
        match step {
            StartStep::RegisterSignalHandler => self.register_signal_handler(),
            StartStep::PrepareClient => self.prepare_client(),
            StartStep::PrepareProvider => self.prepare_provider().await,
            StartStep::StartMetricsServer => self.start_metrics_server().await,
            StartStep::StartExporterService => self.start_exporter_service(),
        }
    }

    fn register_signal_handler(&mut self) -> Result<()> {
        // Subscribe before anything can broadcast
        self.server_shutdown = Some(self.shutdown.subscribe());
        self.exporter_shutdown = Some(self.shutdown.subscribe());

        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        let shutdown = self.shutdown.clone();
        let logger = self.logger.clone();
        tokio::spawn(async move {
            #[cfg(unix)]
            let reason = tokio::select! {
                _ = interrupt() => "SIGINT received",
                _ = terminate.recv() => "SIGTERM received",
            };
            #[cfg(not(unix))]
            let reason = {
                interrupt().await;
                "SIGINT received"
            };

            logger.log_shutdown(reason);
            let _ = shutdown.send(());
        });

        Ok(())
    }

    fn prepare_client(&mut self) -> Result<()> {
        let path = self.config.service_account_path();
        info!(path = %path.display(), "Preparing GCP client");

        let client = AuthorizedClient::from_service_account_file(&path, &self.version.user_agent())?;
        self.client = Some(client);

        Ok(())
    }

    async fn prepare_provider(&mut self) -> Result<()> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow!("GCP client is not prepared"))?;

        let metrics = ExporterMetrics::new();
        let provider = Provider::initialize(
            client,
            &self.registry,
            &self.values,
            metrics.clone(),
            &self.logger,
        )
        .await?;

        if !provider.collector_names().is_empty() {
            self.metrics_registry.register(Box::new(provider.clone()))?;
        }
        metrics.register(&self.metrics_registry)?;

        self.provider = Some(provider);
        Ok(())
    }

    async fn start_metrics_server(&mut self) -> Result<()> {
        self.metrics_registry
            .register(Box::new(self.version.collector()?))?;
        #[cfg(target_os = "linux")]
        self.metrics_registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        let Some(server) =
            MetricsServer::bind(&self.config.listen, self.metrics_registry.clone()).await?
        else {
            return Ok(());
        };

        let shutdown = self
            .server_shutdown
            .take()
            .ok_or_else(|| anyhow!("shutdown signal is not registered"))?;
        self.server = Some(tokio::spawn(server.run(shutdown)));

        Ok(())
    }

    fn start_exporter_service(&mut self) -> Result<()> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| anyhow!("collectors provider is not prepared"))?;
        let shutdown = self
            .exporter_shutdown
            .take()
            .ok_or_else(|| anyhow!("shutdown signal is not registered"))?;

        let refresh = RefreshLoop::new(Arc::new(provider), self.config.interval());
        self.exporter = Some(tokio::spawn(refresh.run(shutdown)));

        Ok(())
    }

    /// Wait for both services. A metrics server failure stops the refresh
    /// loop and is returned.
    async fn wait(mut self) -> Result<()> {
        if let Some(server) = self.server.take() {
            let result = server
                .await
                .context("metrics server task failed")
                .and_then(|result| result);

            if let Err(e) = result {
                error!(error = %format!("{e:#}"), "Metrics server stopped");
                let _ = self.shutdown.send(());
                if let Some(exporter) = self.exporter.take() {
                    let _ = exporter.await;
                }
                return Err(e);
            }
        }

        if let Some(exporter) = self.exporter.take() {
            exporter.await.context("exporter task failed")?;
        }

        info!("Exporter stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_run_in_order() {
        assert_eq!(StartStep::ALL[0], StartStep::RegisterSignalHandler);
        assert_eq!(StartStep::ALL[4], StartStep::StartExporterService);
        assert_eq!(
            StartStep::PrepareClient.label(),
            "could not prepare GCP client"
        );
    }

    #[tokio::test]
    async fn test_missing_service_account_file_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let args = StartArgs {
            service_account_file: Some(dir.path().join("missing.json")),
            ..Default::default()
        };

        let err = run(
            args,
            OptionValues::new(),
            exporter_lib::default_registry(),
            VersionInfo::current("gcp-exporter", "0.0.0"),
        )
        .await
        .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.starts_with("could not prepare GCP client"), "{message}");
        assert!(message.contains("doesn't exist"), "{message}");
    }

    #[tokio::test]
    async fn test_zero_interval_fails_before_startup() {
        let args = StartArgs {
            interval: Some(0),
            ..Default::default()
        };

        let result = run(
            args,
            OptionValues::new(),
            exporter_lib::default_registry(),
            VersionInfo::current("gcp-exporter", "0.0.0"),
        )
        .await;
        assert!(result.is_err());
    }
}
