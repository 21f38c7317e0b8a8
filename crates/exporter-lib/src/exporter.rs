//! Periodic data refresh
//!
//! Runs one refresh right away, then one per interval until shutdown is
//! broadcast.

use crate::collector::Provider;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::info;

/// Something refreshed on every tick of the loop
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn refresh(&self);
}

#[async_trait]
impl DataSource for Provider {
    async fn refresh(&self) {
        self.get_data().await;
    }
}

pub struct RefreshLoop {
    source: Arc<dyn DataSource>,
    interval: Duration,
}

impl RefreshLoop {
    pub fn new(source: Arc<dyn DataSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Run until `shutdown` fires or its sender is dropped
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "GCP data gathering interval"
        );

        self.source.refresh().await;

        loop {
            tokio::select! {
                _ = sleep(self.interval) => {
                    self.source.refresh().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down data refresh loop");
                    break;
                }
            }
        }
    }
}
